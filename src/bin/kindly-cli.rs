use clap::Parser;
use colored::*;
use kindly::builder::{Backend, ProviderBuilder, DEFAULT_TIMEOUT_SECONDS};
use kindly::controller::StreamingTurnController;
use kindly::credentials::CredentialResolver;
use kindly::error::KindlyError;
use kindly::persona::{PersonaConfig, Preset};
use kindly::render::{RenderSurface, CURSOR_GLYPH};
use kindly::secret_store::SecretStore;
use kindly::session::{self, Session};
use kindly::transcript::{Speaker, Transcript};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use spinners::{Spinner, Spinners};
use std::io::{self, IsTerminal, Read, Write};
use std::str::FromStr;
use std::time::Duration;

const RESPONSIBLE_USE_NOTICE: &str = "Kindly is designed to support kind communication. It does not replace teachers, parents, counselors, or real friendships. If a situation feels unsafe or serious, users should talk to a trusted adult.";

/// Command line arguments for the Kindly CLI
#[derive(Parser)]
#[clap(
    name = "kindly",
    about = "Chat with a friendship coach for middle-schoolers",
    allow_hyphen_values = true
)]
struct CliArgs {
    /// Command to execute (chat, set, get, delete)
    #[arg(index = 1)]
    command: Option<String>,

    /// Secret key for set/get/delete, or a one-shot message for chat
    #[arg(index = 2)]
    key_or_prompt: Option<String>,

    /// Secret value for set command
    #[arg(index = 3)]
    value: Option<String>,

    /// Persona preset (friendly, kindly)
    #[arg(long, default_value = "friendly")]
    persona: String,

    /// Persona JSON file, overrides --persona
    #[arg(long)]
    persona_file: Option<String>,

    /// Provider name (google, openai); defaults to the persona's backend
    #[arg(long)]
    provider: Option<String>,

    /// Model name to use
    #[arg(long)]
    model: Option<String>,

    /// System prompt replacing the persona's
    #[arg(long)]
    system: Option<String>,

    /// API key for the provider
    #[arg(long)]
    api_key: Option<String>,

    /// Base URL for the API
    #[arg(long)]
    base_url: Option<String>,

    /// Temperature setting (0.0-2.0)
    #[arg(long)]
    temperature: Option<f32>,

    /// Maximum tokens in the response
    #[arg(long)]
    max_tokens: Option<u32>,

    /// Seconds to wait for a complete reply
    #[arg(long, default_value_t = DEFAULT_TIMEOUT_SECONDS)]
    timeout: u64,
}

/// Prints a streamed reply to the terminal.
///
/// A spinner runs until the first fragment. Each fragment prints only the
/// text that is new since the previous one and moves the cursor glyph to
/// the end. Output is already in transcript order, so a transcript redraw
/// only records how many entries are on screen.
struct TerminalSurface {
    label: String,
    interactive: bool,
    spinner: Option<Spinner>,
    printed: usize,
    cursor_shown: bool,
    entries_shown: usize,
}

impl TerminalSurface {
    fn new(label: &str, interactive: bool) -> Self {
        Self {
            label: label.to_string(),
            interactive,
            spinner: None,
            printed: 0,
            cursor_shown: false,
            entries_shown: 0,
        }
    }

    /// Resets for the next turn and starts the thinking spinner.
    fn begin_turn(&mut self) {
        self.printed = 0;
        self.cursor_shown = false;
        if self.interactive {
            self.spinner = Some(Spinner::new(
                Spinners::Dots12,
                "Thinking...".bright_magenta().to_string(),
            ));
        }
    }

    /// Stops the spinner and prints the reply label once.
    fn start_reply(&mut self) {
        if let Some(mut sp) = self.spinner.take() {
            sp.stop();
            print!("\r\x1B[K");
            print!("{} ", format!("{}:", self.label).bright_green());
        }
    }

    fn erase_cursor(&mut self) {
        if self.cursor_shown {
            print!("\u{8} \u{8}");
            self.cursor_shown = false;
        }
    }
}

impl RenderSurface for TerminalSurface {
    fn on_fragment(&mut self, partial_with_cursor: &str) {
        self.start_reply();
        let partial = partial_with_cursor
            .strip_suffix(CURSOR_GLYPH)
            .unwrap_or(partial_with_cursor);
        let new_text = partial.get(self.printed..).unwrap_or_default();

        self.erase_cursor();
        print!("{new_text}");
        if self.interactive {
            print!("{}", CURSOR_GLYPH.to_string().bright_black());
            self.cursor_shown = true;
        }
        self.printed = partial.len();
        let _ = io::stdout().flush();
    }

    fn on_commit(&mut self, final_text: &str) {
        self.start_reply();
        self.erase_cursor();
        print!("{}", final_text.get(self.printed..).unwrap_or_default());
        println!();
        if self.interactive {
            println!("{}", "─".repeat(50).bright_black());
        }
    }

    fn on_error(&mut self, message: &str) {
        if let Some(mut sp) = self.spinner.take() {
            sp.stop();
            print!("\r\x1B[K");
        }
        self.erase_cursor();
        if self.printed > 0 {
            println!();
        }
        eprintln!("{} {}", "Error:".bright_red(), message);
        if self.interactive {
            println!("{}", "─".repeat(50).bright_black());
        }
    }

    fn on_transcript(&mut self, transcript: &Transcript) {
        log::debug!(
            "transcript redraw: {} entries ({} new)",
            transcript.len(),
            transcript.len().saturating_sub(self.entries_shown)
        );
        self.entries_shown = transcript.len();
    }
}

/// Prints every committed entry, used once when the session opens.
fn print_transcript(transcript: &Transcript, persona: &PersonaConfig) {
    for entry in transcript {
        match entry.speaker() {
            Speaker::Assistant => println!(
                "{} {}",
                format!("{}:", persona.name).bright_green(),
                entry.text()
            ),
            Speaker::User => println!("{} {}", "You:".bright_blue(), entry.text()),
        }
    }
    println!("{}", "─".repeat(50).bright_black());
}

/// Builds the persona from the preset or file, then applies overrides.
fn load_persona(args: &CliArgs) -> Result<PersonaConfig, KindlyError> {
    let mut persona = match args.persona_file.as_deref() {
        Some(path) => PersonaConfig::from_file(path)?,
        None => Preset::from_str(&args.persona)?.config(),
    };

    if let Some(provider) = args.provider.as_deref() {
        let backend = Backend::from_str(provider)?;
        if backend != persona.backend && args.model.is_none() {
            return Err(KindlyError::InvalidRequest(format!(
                "--model is required when switching persona '{}' from {} to {backend}",
                persona.name, persona.backend
            )));
        }
        persona.backend = backend;
    }
    if let Some(model) = args.model.clone() {
        persona = persona.with_model(model);
    }
    if let Some(system) = args.system.clone() {
        persona = persona.with_system_prompt(system);
    }
    if let Some(temp) = args.temperature {
        persona = persona.with_temperature(temp);
    }
    if let Some(mt) = args.max_tokens {
        persona = persona.with_max_tokens(mt);
    }
    persona.validate()?;
    Ok(persona)
}

/// Handles the secret management commands. Returns true when a command ran.
fn run_secret_command(args: &CliArgs) -> Result<bool, Box<dyn std::error::Error>> {
    match args.command.as_deref() {
        Some("set") => {
            if let (Some(key), Some(value)) = (args.key_or_prompt.as_deref(), args.value.as_deref())
            {
                let mut store = SecretStore::new()?;
                store.set(key, value)?;
                println!("{} Secret '{}' has been set.", "✓".bright_green(), key);
            } else {
                eprintln!("{} Usage: kindly-cli set <key> <value>", "Error:".bright_red());
            }
            Ok(true)
        }
        Some("get") => {
            if let Some(key) = args.key_or_prompt.as_deref() {
                let store = SecretStore::new()?;
                match store.get(key) {
                    Some(value) => println!("{}: {}", key, value),
                    None => println!("{} Secret '{}' not found", "!".bright_yellow(), key),
                }
            } else {
                eprintln!("{} Usage: kindly-cli get <key>", "Error:".bright_red());
            }
            Ok(true)
        }
        Some("delete") => {
            if let Some(key) = args.key_or_prompt.as_deref() {
                let mut store = SecretStore::new()?;
                store.delete(key)?;
                println!("{} Secret '{}' has been deleted.", "✓".bright_green(), key);
            } else {
                eprintln!("{} Usage: kindly-cli delete <key>", "Error:".bright_red());
            }
            Ok(true)
        }
        None | Some("chat") => Ok(false),
        Some(other) => Err(format!("Unknown command '{other}'. Use chat, set, get or delete").into()),
    }
}

/// Runs one turn from a one-shot argument or piped stdin.
async fn run_once(
    controller: &StreamingTurnController,
    session: &Session,
    persona_name: &str,
    prompt: String,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut surface = TerminalSurface::new(persona_name, false);
    surface.begin_turn();
    match controller.submit_turn(session, &prompt, &mut surface).await {
        Ok(_) => Ok(()),
        // Already shown through the surface
        Err(e) if e.is_turn_failure() => std::process::exit(1),
        Err(e) => Err(e.into()),
    }
}

/// Main entry point for the Kindly CLI application
///
/// Handles secret management, resolves the API key, then either runs a
/// single turn (argument or piped input) or an interactive chat.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    kindly::init_logging();
    let args = CliArgs::parse();

    if run_secret_command(&args)? {
        return Ok(());
    }

    let persona = load_persona(&args)?;

    let credential = match CredentialResolver::for_backend(persona.backend)
        .with_explicit(args.api_key.clone())
        .resolve()
    {
        Ok(credential) => credential,
        Err(e) => {
            eprintln!("{} {}", "Error:".bright_red(), e);
            std::process::exit(1);
        }
    };
    log::info!("using {} key from {}", persona.backend, credential.source());

    let mut builder = ProviderBuilder::new()
        .backend(persona.backend)
        .api_key(credential.into_inner())
        .timeout_seconds(args.timeout);
    if let Some(url) = args.base_url.clone() {
        builder = builder.base_url(url);
    }
    let provider = builder
        .build()
        .map_err(|e| format!("Failed to build provider: {}", e))?;

    let session = session::create_session(persona.greeting.clone());
    let persona_name = persona.name.clone();
    let controller = StreamingTurnController::new(provider, persona)
        .with_timeout(Duration::from_secs(args.timeout));

    if let Some(prompt) = args.key_or_prompt.clone() {
        return run_once(&controller, &session, &persona_name, prompt).await;
    }
    if !io::stdin().is_terminal() {
        let mut input = String::new();
        io::stdin().read_to_string(&mut input)?;
        return run_once(&controller, &session, &persona_name, input).await;
    }

    println!("{}", format!("🤗 {persona_name}").bright_cyan().bold());
    println!("{}", "The AI coach for middle-schoolers".bright_cyan());
    println!();
    println!("{}", "Responsible Use Notice".bright_yellow().bold());
    println!("{}", RESPONSIBLE_USE_NOTICE.bright_yellow());
    println!("{}", "Type 'exit' to quit".bright_black());
    println!("{}", "─".repeat(50).bright_black());
    print_transcript(&*session.transcript().await, controller.persona());

    let mut rl = DefaultEditor::new()?;
    let mut surface = TerminalSurface::new(&persona_name, true);
    surface.on_transcript(&*session.transcript().await);

    loop {
        io::stdout().flush()?;
        let readline = rl.readline("> ");
        match readline {
            Ok(line) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                if trimmed.eq_ignore_ascii_case("exit") {
                    println!("{}", "👋 Goodbye!".bright_cyan());
                    break;
                }
                let _ = rl.add_history_entry(trimmed);

                surface.begin_turn();
                // Turn failures were already shown by the surface; the session stays usable.
                if let Err(e) = controller.submit_turn(&session, &line, &mut surface).await {
                    if !e.is_turn_failure() {
                        eprintln!("{} {}", "Error:".bright_red(), e);
                    }
                }
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => {
                println!("\n{}", "👋 Goodbye!".bright_cyan());
                break;
            }
            Err(err) => {
                eprintln!("{} {:?}", "Error:".bright_red(), err);
                break;
            }
        }
    }

    session::dispose(&session);
    Ok(())
}
