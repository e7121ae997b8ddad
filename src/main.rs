use clap::Parser; // for cli
use completion_cache::{Args, CachingClient, ChatMessage, ChatRequest, OllamaClient, metrics};
use tracing_subscriber::EnvFilter;

const PROMPTS: [&str; 5] = [
    "Tell me a joke.",
    "Explain the theory of relativity.",
    "What's the capital of France?",
    "How does a computer work?",
    "What's the meaning of life?",
];

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // parse cli arguments
    let args = Args::parse();
    let models = args.model_list();
    if models.is_empty() {
        anyhow::bail!("At least one model required");
    }

    let remote = OllamaClient::new(reqwest::Client::new(), &args.ollama_url);
    tracing::info!("Forwarding to Ollama at {}", remote.base_url());
    let client = CachingClient::new(remote, args.cache_config());

    if args.clear_cache {
        client.clear().await?;
    }

    for model in &models {
        println!("Testing model: {}", model);
        for prompt in PROMPTS {
            let request = ChatRequest::new(model.as_str(), vec![ChatMessage::user(prompt)])
                .with_seed(args.seed)
                .with_max_tokens(args.max_tokens);

            match client.get_response(&request).await {
                Ok(completion) if completion.cached => {
                    println!("Cached response for prompt '{}': {}", prompt, completion.content)
                }
                Ok(completion) => {
                    println!("API response for prompt '{}': {}", prompt, completion.content)
                }
                Err(e) => println!("Error fetching response for prompt '{}': {}", prompt, e),
            }
        }

        if args.check_determinism {
            let request = ChatRequest::new(model.as_str(), vec![ChatMessage::user(PROMPTS[0])])
                .with_seed(args.seed)
                .with_max_tokens(args.max_tokens);
            match client.check_determinism(&request).await {
                Ok(true) => println!("{}: responses are deterministic, safe to cache", model),
                Ok(false) => println!("{}: responses differ between calls, not cacheable", model),
                Err(e) => println!("{}: determinism check failed: {}", model, e),
            }
        }
    }

    if args.cache_requests {
        let stats = client.stats().await?;
        println!(
            "Cache holds {} entries, {} bytes (limit {})",
            stats.entries, stats.total_bytes, args.cache_size_limit
        );
    }

    if args.destroy_on_finish {
        client.clear().await?;
    }

    if args.print_metrics {
        print!("{}", metrics::render());
    }

    Ok(())
}
