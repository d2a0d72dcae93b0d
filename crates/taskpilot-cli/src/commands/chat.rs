use std::io::Write;
use std::sync::Arc;
use tokio::io::AsyncBufReadExt;

use taskpilot_config::TaskPilotConfig;
use taskpilot_runtime::AgentHandle;

pub(super) async fn cmd_chat(
    config: TaskPilotConfig,
    message: Option<String>,
    session: Option<String>,
    user: Option<String>,
) -> anyhow::Result<()> {
    let router = super::build_model_router(&config);
    let registry = super::build_registry(&config, Arc::new(router))?;
    let handle = registry.get(session.as_deref()).await?;

    if let Some(message) = message {
        let reply = handle.chat(user, message).await?;
        println!("{}", reply.content);
        return Ok(());
    }

    println!("TaskPilot chat (session '{}')", handle.session());
    println!("   Type 'exit' or Ctrl+C to quit");
    println!("   Type '/tasks' to list tasks, '/stats' for analytics");
    println!();

    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
    loop {
        eprint!("\x1b[36myou>\x1b[0m ");
        std::io::stderr().flush().ok();

        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) | Err(_) => break,
        };
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        match trimmed {
            "exit" | "quit" | "/exit" => {
                println!("Goodbye!");
                break;
            }
            "/tasks" => print_tasks(&handle).await?,
            "/stats" => {
                let stats = handle.analytics().await?;
                println!("{}", serde_json::to_string_pretty(&stats)?);
            }
            _ => {
                let reply = handle.chat(user.clone(), trimmed).await?;
                eprint!("\x1b[32mtaskpilot>\x1b[0m ");
                println!("{}", reply.content);
            }
        }
    }

    Ok(())
}

async fn print_tasks(handle: &AgentHandle) -> anyhow::Result<()> {
    let tasks = handle.list_tasks(Default::default()).await?;
    if tasks.is_empty() {
        println!("   (no tasks)");
        return Ok(());
    }
    for task in tasks {
        let due = task
            .due_date
            .map(|d| d.format(" due %Y-%m-%d %H:%M").to_string())
            .unwrap_or_default();
        println!(
            "   [{}] {} ({}){}  {}",
            task.status, task.title, task.priority, due, task.id
        );
    }
    Ok(())
}
