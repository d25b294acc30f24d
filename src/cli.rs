use std::time::Duration;

use anyhow::Result;
use colored::*;

use crate::cmd_parser::{self, Action, ParseOutcome, ParsedCommand};
use crate::config::QuillConfig;
use crate::editor::{self, SharedDocument};
use crate::extractor;
use crate::input;
use crate::llm::{CompletionClient, OpenAiClient};
use crate::prompts::PromptsConfig;
use crate::thinking;

/// How many times the user is asked again after unparseable input before the
/// request is abandoned.
const MAX_PARSE_ATTEMPTS: usize = 3;

/// Runs the interactive loop.
pub async fn run(config: QuillConfig) -> Result<()> {
    let header_width = 60;
    println!("{}", "═".repeat(header_width).bright_blue());
    println!("{}", "QUILL - AI Code Writer".bright_white().bold());
    println!("{}", "═".repeat(header_width).bright_blue());

    show_provider_status(&config);

    println!("{}", "─".repeat(header_width).dimmed());
    println!(
        "{}",
        "Ask with: ACTION|<FILE>REQUEST, ACTION|REQUEST, <FILE>REQUEST or plain text".dimmed()
    );
    println!(
        "{}",
        "Actions: new (fresh buffer, default), edit (rewrite current buffer)".dimmed()
    );
    println!("{}", "Commands: /show, /clear, /help, /quit".dimmed());
    println!();

    let prompts = PromptsConfig::load().unwrap_or_default();
    let mut doc = editor::shared_document();

    loop {
        let user_input = input::read_line()?;
        let trimmed_input = user_input.trim();

        if trimmed_input.is_empty() {
            continue;
        }

        if trimmed_input.starts_with('/') {
            handle_command(trimmed_input, &doc).await;
            continue;
        }

        let command = match collect_command(trimmed_input)? {
            Some(command) => command,
            None => continue,
        };

        let client = match OpenAiClient::new(&config.llm, &prompts) {
            Ok(client) => client,
            Err(e) => {
                // Missing credential: abort before any network call.
                eprintln!("{} {}", "Error:".red(), e);
                continue;
            }
        };

        if let Err(e) = run_request(&command, &mut doc, &client, &prompts, &config).await {
            eprintln!("{} {}", "Error:".red(), e);
        }

        println!();
    }
}

fn show_provider_status(config: &QuillConfig) {
    println!(
        "{} {} ({})",
        "Model:".dimmed(),
        config.llm.model.cyan(),
        config.llm.base_url
    );
    if config.llm.api_key.is_none() {
        println!(
            "{} {}",
            "Warning:".yellow(),
            "No API key found. Set with: export OPENAI_API_KEY=your_api_key"
        );
    }
}

async fn handle_command(command: &str, doc: &SharedDocument) {
    match command {
        "/quit" => {
            println!("{}", "─".repeat(60).dimmed());
            println!("{}", "Goodbye!".bright_white());
            std::process::exit(0);
        }
        "/help" => {
            println!("  ACTION|<FILE>REQUEST  ask, naming the target file");
            println!("  ACTION|REQUEST        ask without a target file");
            println!("  <FILE>REQUEST         ask, defaulting to a new buffer");
            println!("  REQUEST               plain request, new buffer");
            println!("  /show                 print the current buffer");
            println!("  /clear                close the current buffer");
            println!("  /quit                 exit");
        }
        "/show" => {
            let document = doc.lock().await;
            if document.is_empty() {
                println!("{}", "(empty buffer)".dimmed());
            } else {
                for line in document.lines() {
                    println!("{}", line);
                }
            }
        }
        "/clear" => {
            let mut document = doc.lock().await;
            document.clear();
            document.close();
            println!("{}", "Buffer closed.".dimmed());
        }
        _ => {
            println!("Unknown command: {}. Type '/help' for available commands.", command);
        }
    }
}

/// Turns raw input into a command, re-prompting on invalid input up to the
/// attempt bound. `None` means there is nothing to do (empty input or the
/// user ran out of attempts).
fn collect_command(first_line: &str) -> Result<Option<ParsedCommand>> {
    let mut raw = first_line.to_string();

    for attempt in 1..=MAX_PARSE_ATTEMPTS {
        let outcome = cmd_parser::parse_input(Some(&raw), |warning| {
            println!("{} {}", "Warning:".yellow(), warning);
        });

        match outcome {
            ParseOutcome::Empty => return Ok(None),
            ParseOutcome::Command(command) => return Ok(Some(command)),
            ParseOutcome::Invalid(reason) => {
                println!("{} {}", "Error:".red(), reason);
                if attempt == MAX_PARSE_ATTEMPTS {
                    break;
                }
                println!("{}", "Try again:".dimmed());
                raw = input::read_line()?;
            }
        }
    }

    println!("{}", "Giving up on this request.".dimmed());
    Ok(None)
}

/// One full request: digest the buffer, call the model, extract the code,
/// write it into the buffer line by line, save if a file name was given.
async fn run_request(
    command: &ParsedCommand,
    doc: &mut SharedDocument,
    client: &dyn CompletionClient,
    prompts: &PromptsConfig,
    config: &QuillConfig,
) -> Result<()> {
    // The digest always covers the buffer as it was before this request.
    let buffer_text = doc.lock().await.text();
    let full_prompt = prompts.build_full_prompt(&command.prompt);

    println!("{}", "#####################".dimmed());
    println!("{}", format!("Full prompt: {}", full_prompt).dimmed());
    println!("{}", "#####################".dimmed());

    let spinner = thinking::show_waiting_for_model();
    let response = client.complete(&buffer_text, &full_prompt).await;
    spinner.finish();
    let response = response?;

    if extractor::is_refusal(&response) {
        anyhow::bail!("The model declined to produce code for this request; nothing was written.");
    }

    let lines = extractor::extract_code(&response);

    match command.action {
        Action::New => {
            *doc = editor::shared_document();
        }
        Action::Edit => {
            doc.lock().await.clear();
        }
    }
    let baseline = doc.lock().await.version();

    editor::insert_lines(doc, &lines, Duration::from_millis(config.editor.insert_delay_ms)).await;

    if let Some(file_name) = &command.file_name {
        editor::wait_for_change(
            doc,
            baseline,
            Duration::from_millis(config.editor.save_wait_ms),
        )
        .await;

        let document = doc.lock().await;
        if document.is_closed() {
            return Ok(());
        }
        let path = editor::save_document(&document, &config.workspace_root(), file_name)?;
        println!("{} {}", "Saved:".green(), path.display());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tempfile::TempDir;

    struct MockClient {
        response: String,
        seen_buffer: Mutex<Option<String>>,
    }

    impl MockClient {
        fn new(response: &str) -> Self {
            Self {
                response: response.to_string(),
                seen_buffer: Mutex::new(None),
            }
        }
    }

    #[async_trait]
    impl CompletionClient for MockClient {
        async fn complete(&self, buffer_text: &str, _full_prompt: &str) -> Result<String> {
            *self.seen_buffer.lock().unwrap() = Some(buffer_text.to_string());
            Ok(self.response.clone())
        }
    }

    fn test_config(workspace: &TempDir) -> QuillConfig {
        let mut config = QuillConfig::default();
        config.editor.insert_delay_ms = 1;
        config.editor.save_wait_ms = 20;
        config.editor.workspace_root = Some(workspace.path().to_path_buf());
        config
    }

    fn swap_command() -> ParsedCommand {
        match cmd_parser::parse_input(Some("new|<swap.py>swap two strings in python"), |_| {}) {
            ParseOutcome::Command(command) => command,
            other => panic!("expected a command, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_end_to_end_fenced_response_is_written_and_saved() {
        let workspace = TempDir::new().unwrap();
        let config = test_config(&workspace);
        let prompts = PromptsConfig::default();
        let client = MockClient::new("```python\na,b=b,a\n```");
        let mut doc = editor::shared_document();

        let command = swap_command();
        run_request(&command, &mut doc, &client, &prompts, &config)
            .await
            .unwrap();

        assert_eq!(doc.lock().await.lines(), &["a,b=b,a"]);

        let saved = std::fs::read_to_string(workspace.path().join("swap.py")).unwrap();
        assert_eq!(saved, "a,b=b,a\n");
    }

    #[tokio::test]
    async fn test_unfenced_response_is_written_verbatim() {
        let workspace = TempDir::new().unwrap();
        let config = test_config(&workspace);
        let prompts = PromptsConfig::default();
        let client = MockClient::new("print(1)");
        let mut doc = editor::shared_document();

        let command = match cmd_parser::parse_input(Some("print one"), |_| {}) {
            ParseOutcome::Command(command) => command,
            other => panic!("expected a command, got {:?}", other),
        };

        run_request(&command, &mut doc, &client, &prompts, &config)
            .await
            .unwrap();

        assert_eq!(doc.lock().await.lines(), &["print(1)"]);
    }

    #[tokio::test]
    async fn test_refusal_aborts_without_writing() {
        let workspace = TempDir::new().unwrap();
        let config = test_config(&workspace);
        let prompts = PromptsConfig::default();
        let client = MockClient::new("NO_CODE");
        let mut doc = editor::shared_document();
        doc.lock().await.append_line("original");

        let command = swap_command();
        let result = run_request(&command, &mut doc, &client, &prompts, &config).await;

        assert!(result.is_err());
        assert_eq!(doc.lock().await.lines(), &["original"]);
        assert!(!workspace.path().join("swap.py").exists());
    }

    #[tokio::test]
    async fn test_digest_sees_buffer_before_the_edit() {
        let workspace = TempDir::new().unwrap();
        let config = test_config(&workspace);
        let prompts = PromptsConfig::default();
        let client = MockClient::new("```python\nnew body\n```");
        let mut doc = editor::shared_document();
        doc.lock().await.append_line("old body");

        let command = match cmd_parser::parse_input(Some("edit|rewrite it"), |_| {}) {
            ParseOutcome::Command(command) => command,
            other => panic!("expected a command, got {:?}", other),
        };

        run_request(&command, &mut doc, &client, &prompts, &config)
            .await
            .unwrap();

        assert_eq!(
            client.seen_buffer.lock().unwrap().as_deref(),
            Some("old body")
        );
        assert_eq!(doc.lock().await.lines(), &["new body"]);
    }

    #[tokio::test]
    async fn test_new_action_replaces_buffer() {
        let workspace = TempDir::new().unwrap();
        let config = test_config(&workspace);
        let prompts = PromptsConfig::default();
        let client = MockClient::new("```rust\nfn main() {}\n```");
        let mut doc = editor::shared_document();
        doc.lock().await.append_line("left over");

        let command = match cmd_parser::parse_input(Some("new|a rust main"), |_| {}) {
            ParseOutcome::Command(command) => command,
            other => panic!("expected a command, got {:?}", other),
        };

        run_request(&command, &mut doc, &client, &prompts, &config)
            .await
            .unwrap();

        assert_eq!(doc.lock().await.lines(), &["fn main() {}"]);
    }

    #[tokio::test]
    async fn test_no_file_name_means_no_save() {
        let workspace = TempDir::new().unwrap();
        let config = test_config(&workspace);
        let prompts = PromptsConfig::default();
        let client = MockClient::new("```python\npass\n```");
        let mut doc = editor::shared_document();

        let command = match cmd_parser::parse_input(Some("new|do nothing"), |_| {}) {
            ParseOutcome::Command(command) => command,
            other => panic!("expected a command, got {:?}", other),
        };

        run_request(&command, &mut doc, &client, &prompts, &config)
            .await
            .unwrap();

        assert_eq!(std::fs::read_dir(workspace.path()).unwrap().count(), 0);
    }
}
