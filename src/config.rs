use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_CACHE_SIZE_LIMIT: u64 = 10 * 1024 * 1024;
pub const DEFAULT_CACHE_DIR: &str = "cache";

/// Settings the cache layer itself consumes.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub enabled: bool,
    // bytes of payload kept before LRU eviction kicks in
    pub size_limit: u64,
    pub cache_dir: PathBuf,
    pub request_timeout: Option<Duration>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            size_limit: DEFAULT_CACHE_SIZE_LIMIT,
            cache_dir: PathBuf::from(DEFAULT_CACHE_DIR),
            request_timeout: None,
        }
    }
}

// CLI argument structure
#[derive(Parser, Debug, Clone)]
#[command(name = "completion-cache")]
#[command(about = "Deterministic on-disk response cache for Ollama chat completions")]
pub struct Args {
    // Enable caching of requests
    #[arg(long)]
    pub cache_requests: bool,

    // Cache size limit in bytes
    #[arg(long, default_value_t = DEFAULT_CACHE_SIZE_LIMIT)]
    pub cache_size_limit: u64,

    // Directory holding response-cache.json
    #[arg(long, default_value = DEFAULT_CACHE_DIR)]
    pub cache_dir: PathBuf,

    // Remove the cache directory once the run is done
    #[arg(long)]
    pub destroy_on_finish: bool,

    // Remove the cache directory before starting (repairs a corrupt cache)
    #[arg(long)]
    pub clear_cache: bool,

    // Call each model twice without the cache and report whether answers match
    #[arg(long)]
    pub check_determinism: bool,

    // Print prometheus metrics at the end of the run
    #[arg(long)]
    pub print_metrics: bool,

    // Ollama server url
    #[arg(short, long, default_value = "http://localhost:11434")]
    pub ollama_url: String,

    // Models to test (comma-separated)
    #[arg(short, long, default_value = "llama3.2,qwen2.5")]
    pub models: String,

    #[arg(long, default_value_t = 12345)]
    pub seed: i64,

    // Maximum tokens per completion
    #[arg(long, default_value_t = 100)]
    pub max_tokens: u32,

    // Remote call timeout in seconds (0 = none)
    #[arg(short, long, default_value_t = 120)]
    pub timeout: u64,
}

impl Args {
    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig {
            enabled: self.cache_requests,
            size_limit: self.cache_size_limit,
            cache_dir: self.cache_dir.clone(),
            request_timeout: (self.timeout > 0).then(|| Duration::from_secs(self.timeout)),
        }
    }

    pub fn model_list(&self) -> Vec<String> {
        self.models
            .split(',')
            .map(|s| s.trim()) // remove spaces
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let args = Args::parse_from(["completion-cache"]);
        let config = args.cache_config();
        assert!(!config.enabled);
        assert_eq!(config.size_limit, 10_485_760);
        assert_eq!(config.cache_dir, PathBuf::from("cache"));
        assert_eq!(config.request_timeout, Some(Duration::from_secs(120)));
        assert!(!args.destroy_on_finish);
    }

    #[test]
    fn test_flags() {
        let args = Args::parse_from([
            "completion-cache",
            "--cache-requests",
            "--cache-size-limit",
            "2048",
            "--cache-dir",
            "/tmp/cc",
            "--timeout",
            "0",
            "--models",
            "a, b,,c",
        ]);
        let config = args.cache_config();
        assert!(config.enabled);
        assert_eq!(config.size_limit, 2048);
        assert_eq!(config.cache_dir, PathBuf::from("/tmp/cc"));
        assert_eq!(config.request_timeout, None);
        assert_eq!(args.model_list(), vec!["a", "b", "c"]);
    }
}
