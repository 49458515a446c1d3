//! Tests for [`TokenEstimator`] with an injected tokenizer loader.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use huginn::{
    EstimatorConfig, HuginnError, Result, TokenEstimator, TokenizerLoader, TokenizerProvider,
    TokenizerSource,
};

/// Counts whitespace-separated words.
struct WordTokenizer;

impl TokenizerProvider for WordTokenizer {
    fn count_tokens(&self, text: &str) -> Result<usize> {
        Ok(text.split_whitespace().count())
    }

    fn tokenize(&self, text: &str) -> Result<Vec<u32>> {
        Ok((0..text.split_whitespace().count() as u32).collect())
    }
}

/// Loader that counts how often it is asked to load.
#[derive(Default)]
struct CountingLoader {
    loads: AtomicUsize,
    fail: bool,
}

impl TokenizerLoader for CountingLoader {
    fn load(&self, _source: &TokenizerSource) -> Result<Arc<dyn TokenizerProvider>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(HuginnError::Tokenizer("hub unreachable".to_string()));
        }
        Ok(Arc::new(WordTokenizer))
    }
}

fn estimator_with(loader: Arc<CountingLoader>) -> TokenEstimator {
    TokenEstimator::without_loader(&EstimatorConfig::default()).with_loader(loader)
}

#[test]
fn empty_text_is_zero_without_loading() {
    let loader = Arc::new(CountingLoader::default());
    let estimator = estimator_with(Arc::clone(&loader));

    assert_eq!(estimator.estimate("", "gpt-4"), 0);
    assert_eq!(loader.loads.load(Ordering::SeqCst), 0);
}

#[test]
fn uses_tokenizer_when_available() {
    let loader = Arc::new(CountingLoader::default());
    let estimator = estimator_with(Arc::clone(&loader));

    assert_eq!(estimator.estimate("one two three", "gpt-4"), 3);
    assert_eq!(estimator.count_tokens("one two", "gpt-4").unwrap(), 2);
}

#[test]
fn tokenizer_is_loaded_once_per_model() {
    let loader = Arc::new(CountingLoader::default());
    let estimator = estimator_with(Arc::clone(&loader));

    for _ in 0..5 {
        estimator.estimate("a b c", "claude-3-opus");
    }
    estimator.estimate("a b c", "gpt-4");

    assert_eq!(loader.loads.load(Ordering::SeqCst), 2);
    assert_eq!(estimator.cached_tokenizers(), 2);
}

#[test]
fn concurrent_first_use_loads_once() {
    let loader = Arc::new(CountingLoader::default());
    let estimator = Arc::new(estimator_with(Arc::clone(&loader)));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let estimator = Arc::clone(&estimator);
            thread::spawn(move || estimator.estimate("x y", "mistral-7b"))
        })
        .collect();
    for handle in handles {
        assert_eq!(handle.join().unwrap(), 2);
    }
    assert_eq!(loader.loads.load(Ordering::SeqCst), 1);
}

#[test]
fn load_failure_falls_back_and_is_remembered() {
    let loader = Arc::new(CountingLoader {
        fail: true,
        ..Default::default()
    });
    let estimator = estimator_with(Arc::clone(&loader));

    assert_eq!(estimator.estimate("abcdefgh", "gpt-4"), 2);
    assert_eq!(estimator.estimate("abcdefgh", "gpt-4"), 2);
    assert_eq!(loader.loads.load(Ordering::SeqCst), 1);
    assert!(matches!(
        estimator.count_tokens("abcdefgh", "gpt-4"),
        Err(HuginnError::Tokenizer(_))
    ));
}

#[test]
fn remembered_failure_expires() {
    let loader = Arc::new(CountingLoader {
        fail: true,
        ..Default::default()
    });
    let config = EstimatorConfig::new().failure_ttl(Duration::from_millis(50));
    let estimator = TokenEstimator::without_loader(&config).with_loader(loader.clone());

    estimator.estimate("abcd", "gpt-4");
    thread::sleep(Duration::from_millis(150));
    estimator.estimate("abcd", "gpt-4");

    assert_eq!(loader.loads.load(Ordering::SeqCst), 2);
}

#[test]
fn unknown_model_falls_back() {
    let loader = Arc::new(CountingLoader::default());
    let estimator = estimator_with(Arc::clone(&loader));

    assert_eq!(estimator.estimate("abcdefghijkl", "some-unknown-model"), 3);
    assert_eq!(loader.loads.load(Ordering::SeqCst), 0);
    assert!(estimator.resolve_source("some-unknown-model").is_err());
}

#[test]
fn no_loader_always_falls_back() {
    let estimator = TokenEstimator::without_loader(&EstimatorConfig::default());
    assert_eq!(estimator.estimate("one two three four", "gpt-4"), 4);
    assert!(estimator.count_tokens("one", "gpt-4").is_err());
}

#[test]
fn default_model_is_used() {
    let loader = Arc::new(CountingLoader::default());
    let estimator = estimator_with(loader);
    assert_eq!(estimator.default_model(), "gpt-3.5-turbo");
    assert_eq!(estimator.estimate_default("a b c d"), 4);
}

// ============================================================================
// Mapping resolution
// ============================================================================

#[test]
fn exact_match_beats_prefix() {
    let mut estimator = TokenEstimator::without_loader(&EstimatorConfig::default());
    let local = TokenizerSource::Local {
        path: PathBuf::from("/models/special/tokenizer.json"),
    };
    estimator.register("gpt-4-special", local.clone());

    assert_eq!(estimator.resolve_source("gpt-4-special").unwrap(), local);
    assert_ne!(estimator.resolve_source("gpt-4-turbo").unwrap(), local);
    // longest prefix wins for unregistered suffixes
    assert_eq!(estimator.resolve_source("gpt-4-special-2").unwrap(), local);
}

#[test]
fn custom_alias_resolves() {
    let mut estimator = TokenEstimator::without_loader(&EstimatorConfig::default());
    estimator.register(
        "my-finetune",
        TokenizerSource::Alias {
            target: "mistral".to_string(),
        },
    );

    assert_eq!(
        estimator.resolve_source("my-finetune").unwrap(),
        estimator.resolve_source("mistral").unwrap()
    );
}

#[test]
fn alias_cycle_is_error() {
    let mut estimator = TokenEstimator::without_loader(&EstimatorConfig::default());
    estimator.register(
        "loop-a",
        TokenizerSource::Alias {
            target: "loop-b".to_string(),
        },
    );
    estimator.register(
        "loop-b",
        TokenizerSource::Alias {
            target: "loop-a".to_string(),
        },
    );

    let err = estimator.resolve_source("loop-a").unwrap_err();
    assert!(err.to_string().contains("cycle"));
    // estimation still works
    assert_eq!(estimator.estimate("abcd", "loop-a"), 1);
}
