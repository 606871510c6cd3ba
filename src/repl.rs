//! Interactive prompt.
//!
//! One question per line; blank lines are skipped. `exit`, `quit`, EOF or
//! Ctrl-C end the session.

use std::future::Future;
use std::io::Write;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing::{debug, info, warn};

use crate::agent::QueryAgent;
use crate::error::AppError;

/// Run the prompt on stdin/stdout until the user leaves or presses Ctrl-C.
pub async fn run(agent: &QueryAgent) -> Result<(), AppError> {
    println!("─────────────────────────────────");
    println!(" docquery  (exit, quit or Ctrl-C to leave)");
    println!("─────────────────────────────────");

    let stdin = BufReader::new(tokio::io::stdin());
    let shutdown = async {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("ctrl-c received");
        }
    };
    run_with(agent, stdin, &mut std::io::stdout(), shutdown).await
}

/// Drive the prompt over any line source; `shutdown` completing ends it.
pub async fn run_with<R, W, S>(agent: &QueryAgent, input: R, out: &mut W, shutdown: S) -> Result<(), AppError>
where
    R: AsyncBufRead + Unpin,
    W: Write,
    S: Future<Output = ()>,
{
    let mut lines = input.lines();
    tokio::pin!(shutdown);

    loop {
        write!(out, "> ")?;
        out.flush()?;

        tokio::select! {
            biased;

            _ = &mut shutdown => {
                writeln!(out)?;
                break;
            }

            line = lines.next_line() => {
                match line {
                    Err(e) => {
                        warn!("stdin read error: {e}");
                        break;
                    }
                    Ok(None) => {
                        debug!("stdin closed");
                        writeln!(out)?;
                        break;
                    }
                    Ok(Some(input)) => {
                        let input = input.trim();
                        if input.is_empty() {
                            continue;
                        }
                        if input.eq_ignore_ascii_case("exit") || input.eq_ignore_ascii_case("quit") {
                            break;
                        }
                        let reply = agent.ask(input).await;
                        writeln!(out, "{}\n", reply.text)?;
                    }
                }
            }
        }
    }
    Ok(())
}
