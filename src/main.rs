mod cli;
mod cmd_parser;
mod config;
mod editor;
mod extractor;
mod input;
mod llm;
mod prompts;
mod thinking;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = config::load_or_create_config(None)?;
    cli::run(config).await
}
