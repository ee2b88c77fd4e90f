//! Line-oriented REPL: one line in, one user-facing projection out.

use std::io::Write;

use tokio::io::{AsyncBufReadExt, BufReader};

use toolgate_core::agent::Agent;
use toolgate_core::agent_loop::{AgentLoop, TurnEnd};

use crate::logging::TurnLogger;

const QUIT: &str = "quit";

pub async fn run<A: Agent>(
    mut agent_loop: AgentLoop<A>,
    logger: TurnLogger,
) -> anyhow::Result<()> {
    let stdin = BufReader::new(tokio::io::stdin());
    let mut lines = stdin.lines();

    prompt()?;
    while let Some(line) = lines.next_line().await? {
        let query = line.trim();
        if query.is_empty() {
            prompt()?;
            continue;
        }
        if query == QUIT {
            break;
        }

        let before = agent_loop.conversation().len();
        let end = agent_loop.run_turn(query).await;

        // Skip the echoed query itself; print what the turn produced.
        let mut printed = false;
        for line in agent_loop.conversation().user_facing_lines(before + 1) {
            println!("{line}");
            printed = true;
        }
        if !printed {
            // Every turn prints something, whatever the model did.
            match &end {
                TurnEnd::FinalResponse(text) | TurnEnd::UserInput(text) => println!("{text}"),
                TurnEnd::Exception(message) => println!("error: {message}"),
                TurnEnd::DepthExhausted => println!("(turn stopped at the depth cap)"),
            }
        }

        match logger.log_turn(agent_loop.conversation()) {
            Ok(path) => tracing::debug!(path = %path.display(), "turn logged"),
            Err(error) => tracing::warn!(%error, "failed to write turn log"),
        }

        prompt()?;
    }

    Ok(())
}

fn prompt() -> std::io::Result<()> {
    print!("> ");
    std::io::stdout().flush()
}
