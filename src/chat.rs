// Terminal front end for a review session: the same flow as the web form,
// driven from stdin/stdout.

use anyhow::{Context, Result};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::info;

use crate::openai::{ChatClient, StreamEvent};
use crate::prompt::{BookMetadata, FeedbackPreference};
use crate::session::{ReviewSession, SessionError, SessionState};

const HELP: &str = "Commands:\n  \
/pref <type>            feedback type: comprehensive, specificity, emotional-expression, structure, recommendation-strength\n  \
/book <title> | <author>  set the book (empty clears it)\n  \
/reset                  start over with a new review\n  \
/help                   show this help\n  \
/quit                   leave\n\
Anything else is sent as your review.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatCommand {
    Review(String),
    Preference(FeedbackPreference),
    Book(BookMetadata),
    Reset,
    Help,
    Quit,
}

/// Parses one input line. Blank lines yield `Ok(None)`.
pub fn parse_line(line: &str) -> Result<Option<ChatCommand>, String> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let Some(rest) = line.strip_prefix('/') else {
        return Ok(Some(ChatCommand::Review(line.to_string())));
    };

    let (name, arg) = match rest.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, arg.trim()),
        None => (rest, ""),
    };
    let command = match name {
        "pref" | "preference" => {
            ChatCommand::Preference(arg.parse::<FeedbackPreference>().map_err(|e| e.to_string())?)
        }
        "book" => {
            let (title, author) = arg.split_once('|').unwrap_or((arg, ""));
            ChatCommand::Book(BookMetadata::new(title.trim(), author.trim()))
        }
        "reset" => ChatCommand::Reset,
        "help" => ChatCommand::Help,
        "quit" | "exit" => ChatCommand::Quit,
        other => return Err(format!("unknown command '/{}' (try /help)", other)),
    };
    Ok(Some(command))
}

/// Runs an interactive session until `/quit` or end of input.
pub async fn run_chat<R, W>(
    client: &ChatClient,
    session: &mut ReviewSession,
    input: R,
    mut output: W,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = input.lines();

    while session.state() == SessionState::AwaitingCredential {
        output.write_all(b"OpenAI API key: ").await?;
        output.flush().await?;
        match lines.next_line().await.context("Failed to read API key")? {
            Some(line) => {
                session.supply_credential(&line);
            }
            None => return Ok(()),
        }
    }

    output
        .write_all(format!("Feedback type: {}. Type /help for commands.\n", session.preference().label()).as_bytes())
        .await?;

    loop {
        output.write_all(b"> ").await?;
        output.flush().await?;
        let Some(line) = lines.next_line().await.context("Failed to read input")? else {
            break;
        };

        let command = match parse_line(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(message) => {
                output.write_all(format!("{}\n", message).as_bytes()).await?;
                continue;
            }
        };

        match command {
            ChatCommand::Quit => break,
            ChatCommand::Help => output.write_all(format!("{}\n", HELP).as_bytes()).await?,
            ChatCommand::Reset => {
                session.reset();
                output.write_all(b"Starting over with a new review.\n").await?;
            }
            ChatCommand::Preference(preference) => {
                session.set_preference(preference);
                output
                    .write_all(format!("Feedback type: {}\n", preference.label()).as_bytes())
                    .await?;
            }
            ChatCommand::Book(book) => {
                session.set_book(book);
                output.write_all(b"Book details updated.\n").await?;
            }
            ChatCommand::Review(text) => {
                let (tx, mut rx) = mpsc::channel::<StreamEvent>(64);
                let out = &mut output;
                let print = async move {
                    while let Some(event) = rx.recv().await {
                        if let StreamEvent::Text(fragment) = event {
                            out.write_all(fragment.as_bytes()).await?;
                            out.flush().await?;
                        }
                    }
                    Ok::<_, std::io::Error>(())
                };
                let (result, printed) = tokio::join!(session.submit(client, &text, tx), print);
                printed?;

                match result {
                    Ok(_) => output.write_all(b"\n\n").await?,
                    Err(e @ SessionError::ModelRequest(_)) => {
                        let hint = e.hint().unwrap_or_default();
                        output
                            .write_all(format!("\nError: {}\n{}\n", e, hint).as_bytes())
                            .await?;
                    }
                    Err(e) => output.write_all(format!("{}\n", e).as_bytes()).await?,
                }
            }
        }
    }

    info!(turns = session.transcript().len(), "Chat session finished");
    output.flush().await?;
    Ok(())
}
