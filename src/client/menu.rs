//! Interactive terminal menu.
//!
//! Reads choices from any [`BufRead`] and writes to any [`Write`], so the
//! same loop drives stdin/stdout and scripted input in tests. A failed run
//! is reported and the menu comes back; only `0` or end of input leaves.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

use super::orchestrator::{Orchestrator, RunOutcome};
use super::store_client::{HttpStoreClient, RemoteStore};
use crate::config::ClientConfig;
use crate::errors::{error_logging, AppError};
use crate::observability::health_checks::check_store_reachable;
use crate::pipeline_errors::PipelineError;
use crate::store::BlobEntry;

/// Entries of the main menu
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuChoice {
    ListImages,
    RemoteToRemote,
    LocalToRemote,
    RemoteToLocal,
    ConfigureServer,
    OpenWebInterface,
    Exit,
}

impl FromStr for MenuChoice {
    type Err = AppError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input.trim() {
            "1" => Ok(MenuChoice::ListImages),
            "2" => Ok(MenuChoice::RemoteToRemote),
            "3" => Ok(MenuChoice::LocalToRemote),
            "4" => Ok(MenuChoice::RemoteToLocal),
            "5" => Ok(MenuChoice::ConfigureServer),
            "6" => Ok(MenuChoice::OpenWebInterface),
            "0" => Ok(MenuChoice::Exit),
            other => Err(AppError::Validation(format!("Unknown menu option '{}'", other))),
        }
    }
}

const MENU_TEXT: &str = "\
=== Otsu binarization client ===
1. List images on the server
2. Process server image -> save to server
3. Process local image -> save to server
4. Process server image -> save locally
5. Configure server URL
6. Open web interface
0. Exit";

/// Upper bound for the liveness probe after changing servers
const REACHABILITY_TIMEOUT: Duration = Duration::from_secs(5);

/// Opens a URL in a browser; swapped out in tests
pub type BrowserOpener = fn(&str) -> io::Result<()>;

fn open_in_browser(url: &str) -> io::Result<()> {
    webbrowser::open(url)
}

/// Menu loop state
pub struct Menu<R: BufRead, W: Write> {
    input: R,
    output: W,
    config: ClientConfig,
    open_browser: BrowserOpener,
}

impl<R: BufRead, W: Write> Menu<R, W> {
    pub fn new(input: R, output: W, config: ClientConfig) -> Self {
        Self {
            input,
            output,
            config,
            open_browser: open_in_browser,
        }
    }

    pub fn with_browser_opener(mut self, opener: BrowserOpener) -> Self {
        self.open_browser = opener;
        self
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Read one trimmed line; `None` at end of input.
    fn prompt(&mut self, label: &str) -> io::Result<Option<String>> {
        write!(self.output, "{}", label)?;
        self.output.flush()?;

        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim().to_string()))
    }

    fn orchestrator(&self) -> Result<Orchestrator<HttpStoreClient>, AppError> {
        let store = HttpStoreClient::new(&self.config)?;
        Ok(Orchestrator::new(store, self.config.local_output_dir.clone()))
    }

    /// Run until the user exits or input ends.
    pub async fn run(&mut self) -> io::Result<()> {
        loop {
            writeln!(self.output, "\n{}", MENU_TEXT)?;
            let Some(line) = self.prompt("Select an option: ")? else {
                return Ok(());
            };

            let choice = match line.parse::<MenuChoice>() {
                Ok(choice) => choice,
                Err(e) => {
                    writeln!(self.output, "{}", e)?;
                    continue;
                }
            };

            if choice == MenuChoice::Exit {
                writeln!(self.output, "Goodbye.")?;
                return Ok(());
            }

            if let Err(e) = self.dispatch(choice).await {
                match &e {
                    MenuError::Pipeline(err) => {
                        writeln!(self.output, "Error ({}): {}", err.kind(), err)?;
                    }
                    MenuError::App(err) => writeln!(self.output, "Error: {}", err)?,
                    MenuError::Io(err) => return Err(io::Error::new(err.kind(), err.to_string())),
                    MenuError::EndOfInput => return Ok(()),
                }
            }
        }
    }

    async fn dispatch(&mut self, choice: MenuChoice) -> Result<(), MenuError> {
        match choice {
            MenuChoice::ListImages => {
                let orchestrator = self.orchestrator()?;
                let entries = orchestrator.store().list_available().await?;
                self.print_entries(&entries)?;
            }
            MenuChoice::RemoteToRemote => {
                let orchestrator = self.orchestrator()?;
                let entry = self.select_remote(&orchestrator).await?;
                let outcome = orchestrator.run_remote_to_remote(&entry.url).await?;
                self.report(&outcome)?;
            }
            MenuChoice::LocalToRemote => {
                let orchestrator = self.orchestrator()?;
                let path = self.prompt("Path to local image: ")?.ok_or(MenuError::EndOfInput)?;
                if path.is_empty() {
                    return Err(AppError::Validation("No path given".to_string()).into());
                }
                let outcome = orchestrator.run_local_to_remote(&PathBuf::from(path)).await?;
                self.report(&outcome)?;
            }
            MenuChoice::RemoteToLocal => {
                let orchestrator = self.orchestrator()?;
                let entry = self.select_remote(&orchestrator).await?;
                let outcome = orchestrator.run_remote_to_local(&entry.url).await?;
                self.report(&outcome)?;
            }
            MenuChoice::ConfigureServer => {
                writeln!(self.output, "Current server: {}", self.config.server_url)?;
                let url = self.prompt("New server URL: ")?.ok_or(MenuError::EndOfInput)?;
                let candidate = ClientConfig {
                    server_url: url.trim_end_matches('/').to_string(),
                    ..self.config.clone()
                };
                candidate.validate()?;
                self.config = candidate;
                writeln!(self.output, "Server set to {}", self.config.server_url)?;

                let timeout = self.config.http_timeout().min(REACHABILITY_TIMEOUT);
                if let Err(e) = check_store_reachable(&self.config.server_url, timeout).await {
                    warn!(error = %e, url = %self.config.server_url, "New server is not reachable");
                    writeln!(self.output, "Warning: {}", e)?;
                }
            }
            MenuChoice::OpenWebInterface => {
                let url = self.config.server_url.clone();
                if let Err(e) = (self.open_browser)(&url) {
                    warn!(error = %e, url = %url, "Could not open browser");
                    writeln!(self.output, "Could not open a browser; visit {} manually", url)?;
                } else {
                    writeln!(self.output, "Opened {}", url)?;
                }
            }
            MenuChoice::Exit => {}
        }
        Ok(())
    }

    fn print_entries(&mut self, entries: &[BlobEntry]) -> io::Result<()> {
        if entries.is_empty() {
            writeln!(self.output, "No images on the server.")?;
            return Ok(());
        }
        writeln!(self.output, "Images on the server:")?;
        for (index, entry) in entries.iter().enumerate() {
            writeln!(self.output, "{}. {}", index + 1, entry.name)?;
        }
        Ok(())
    }

    async fn select_remote(
        &mut self,
        orchestrator: &Orchestrator<HttpStoreClient>,
    ) -> Result<BlobEntry, MenuError> {
        let entries = orchestrator.store().list_available().await?;
        self.print_entries(&entries)?;
        if entries.is_empty() {
            return Err(AppError::Validation("Nothing to process".to_string()).into());
        }

        let raw = self.prompt("Select image number: ")?.ok_or(MenuError::EndOfInput)?;
        let index = raw
            .parse::<usize>()
            .ok()
            .filter(|n| (1..=entries.len()).contains(n))
            .ok_or_else(|| {
                let err = AppError::Validation(format!("'{}' is not a listed image number", raw));
                error_logging::log_validation_error(&err, "select_remote", "image_number", Some(&raw));
                err
            })?;

        Ok(entries[index - 1].clone())
    }

    fn report(&mut self, outcome: &RunOutcome) -> io::Result<()> {
        writeln!(
            self.output,
            "Threshold {} applied to {}x{} image",
            outcome.threshold, outcome.dimensions.0, outcome.dimensions.1
        )?;
        for deposit in &outcome.deposits {
            writeln!(self.output, "Saved {} at {}", deposit.name, deposit.locator)?;
        }
        Ok(())
    }
}

/// Why a menu action stopped
#[derive(Debug)]
enum MenuError {
    Pipeline(PipelineError),
    App(AppError),
    Io(io::Error),
    EndOfInput,
}

impl From<PipelineError> for MenuError {
    fn from(err: PipelineError) -> Self {
        MenuError::Pipeline(err)
    }
}

impl From<AppError> for MenuError {
    fn from(err: AppError) -> Self {
        MenuError::App(err)
    }
}

impl From<io::Error> for MenuError {
    fn from(err: io::Error) -> Self {
        MenuError::Io(err)
    }
}
