use crate::backend::Backend;
use crate::executor::CommandExecutor;
use std::error::Error;
use std::io::{self, Write};
use std::path::Path;
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Clone, Copy)]
pub struct OutputHandlers {
    pub out: fn(&str),
    pub err: fn(&str),
}

impl Default for OutputHandlers {
    fn default() -> Self {
        Self {
            out: |s| println!("{}", s),
            err: |s| eprintln!("{}", s),
        }
    }
}

pub struct FileOptions {
    pub stop_on_error: bool,
}

impl Default for FileOptions {
    fn default() -> Self {
        Self {
            stop_on_error: true,
        }
    }
}

pub struct ReplOptions<'a> {
    pub banner_lines: &'a [&'a str],
    pub prompt: &'a str,
    pub exit_commands: &'a [&'a str],
    pub handle_ctrl_c: bool,
}

/// Lines of a command file worth executing: no blanks, no `#` comments.
pub fn command_lines(content: &str) -> impl Iterator<Item = (usize, &str)> {
    content
        .lines()
        .enumerate()
        .map(|(i, line)| (i + 1, line.trim()))
        .filter(|(_, line)| !line.is_empty() && !line.starts_with('#'))
}

/// Runs one command line, flattening the outcome into printable text.
async fn run_line<B: Backend + ?Sized>(
    backend: &mut B,
    executor: &mut CommandExecutor,
    line: &str,
) -> Result<String, String> {
    executor
        .execute_line(backend, line)
        .await
        .map(|result| result.output)
        .map_err(|e| e.to_string())
}

pub async fn run_file<B: Backend + ?Sized>(
    backend: &mut B,
    executor: &mut CommandExecutor,
    output: OutputHandlers,
    path: &Path,
    options: FileOptions,
) -> Result<(), Box<dyn Error>> {
    let script = tokio::fs::read_to_string(path).await?;
    for (number, line) in command_lines(&script) {
        let outcome = run_line(backend, executor, line).await;
        match outcome {
            Ok(text) => (output.out)(&text),
            Err(message) if options.stop_on_error => {
                (output.err)(&format!("Error on line {} '{}': {}", number, line, message));
                return Err(io::Error::other(message).into());
            }
            Err(message) => {
                (output.err)(&format!("Error on line {} '{}': {}", number, line, message))
            }
        }
        if executor.is_closed() {
            break;
        }
    }
    Ok(())
}

/// What the interactive prompt produced.
#[derive(Debug, PartialEq)]
enum Prompted {
    Command(String),
    Nothing,
    Quit,
}

impl Prompted {
    fn from_line(line: Option<String>, exit_commands: &[&str]) -> Self {
        let Some(line) = line else {
            return Prompted::Quit;
        };
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            Prompted::Nothing
        } else if exit_commands.contains(&line) {
            Prompted::Quit
        } else {
            Prompted::Command(line.to_string())
        }
    }
}

type StdinLines = tokio::io::Lines<BufReader<tokio::io::Stdin>>;

async fn prompt(
    lines: &mut StdinLines,
    options: &ReplOptions<'_>,
) -> Result<Prompted, io::Error> {
    print!("{}", options.prompt);
    io::stdout().flush()?;

    let line = if options.handle_ctrl_c {
        tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => return Ok(Prompted::Quit),
        }
    } else {
        lines.next_line().await?
    };
    Ok(Prompted::from_line(line, options.exit_commands))
}

pub async fn run_repl<B: Backend + ?Sized>(
    backend: &mut B,
    executor: &mut CommandExecutor,
    output: OutputHandlers,
    options: ReplOptions<'_>,
) -> Result<(), Box<dyn Error>> {
    options.banner_lines.iter().for_each(|line| (output.out)(line));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while !executor.is_closed() {
        match prompt(&mut lines, &options).await? {
            Prompted::Command(line) => match run_line(backend, executor, &line).await {
                Ok(text) => (output.out)(&text),
                Err(message) => (output.err)(&format!("Error: {}", message)),
            },
            Prompted::Nothing => {}
            Prompted::Quit => break,
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_lines_skip_comments() {
        let content = "# setup\nnavigate {\"url\": \"https://example.com\"}\n\n  # indented\nget_page_info\n";
        let lines: Vec<_> = command_lines(content).collect();
        assert_eq!(
            lines,
            vec![
                (2, "navigate {\"url\": \"https://example.com\"}"),
                (5, "get_page_info")
            ]
        );
    }

    #[test]
    fn test_prompted_classification() {
        let exits = ["exit", "quit"];
        assert_eq!(Prompted::from_line(None, &exits), Prompted::Quit);
        assert_eq!(Prompted::from_line(Some("  ".into()), &exits), Prompted::Nothing);
        assert_eq!(Prompted::from_line(Some("# note".into()), &exits), Prompted::Nothing);
        assert_eq!(Prompted::from_line(Some(" quit ".into()), &exits), Prompted::Quit);
        assert_eq!(
            Prompted::from_line(Some("get_response ".into()), &exits),
            Prompted::Command("get_response".into())
        );
    }
}
