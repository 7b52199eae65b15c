mod cli;

use std::io::{self, BufRead, Write};
use std::sync::Arc;

use calscribe::backend::http::HttpCalendarBackend;
use calscribe::backend::CalendarBackend;
use calscribe::config::Config;
use calscribe::domain::Query;
use calscribe::event_creator;
use calscribe::llm::ollama::OllamaClient;
use calscribe::llm::LlmClient;
use calscribe::orchestrator::Orchestrator;
use calscribe::store::Store;
use clap::Parser;
use cli::Cli;
use uuid::Uuid;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Cli::parse();
    let mut config = Config::from_env();
    if let Ok(tz) = args.timezone.parse() {
        config.timezone = tz;
    }
    if let Some(db_path) = &args.db_path {
        config.db_path = db_path.into();
    }

    let store = match Store::connect(config.db_path.to_str().unwrap_or("calscribe.db")).await {
        Ok(s) => s,
        Err(e) => {
            eprintln!("✗ could not open database: {e}");
            std::process::exit(1);
        }
    };
    let backend: Arc<dyn CalendarBackend> =
        Arc::new(HttpCalendarBackend::new(config.calbridge_base.clone()));

    if args.list {
        return run_list(&store).await;
    }
    if let Some(id) = &args.delete {
        return run_delete(&backend, &store, id).await;
    }
    if let Some(id) = &args.delete_parent {
        return run_delete_parent(&backend, &store, id).await;
    }
    if args.delete_all {
        return run_delete_all(&backend, &store).await;
    }

    let llm: Arc<dyn LlmClient> = Arc::new(OllamaClient::new(
        config.ollama_base.clone(),
        config.ollama_model.clone(),
    ));
    let orchestrator = Orchestrator::new(llm, backend, store, config.clone());

    if args.interactive {
        return run_interactive(&orchestrator, &config, args.json).await;
    }

    let query_text = match args.query {
        Some(q) => q,
        None => {
            eprintln!("✗ no query given; pass one as an argument or use --interactive");
            std::process::exit(1);
        }
    };

    let exit_code = run_one(&orchestrator, &config, &query_text, args.json).await;
    std::process::exit(exit_code);
}

async fn run_one(orchestrator: &Orchestrator, config: &Config, text: &str, json: bool) -> i32 {
    let now = chrono::Utc::now().with_timezone(&config.timezone);
    let query = Query::new(text, config.timezone);
    let (_, trace) = orchestrator.run(query, now).await;
    if json {
        println!("{}", trace.render_json());
    } else {
        print!("{}", trace.render_human());
    }
    trace.exit_code
}

async fn run_interactive(orchestrator: &Orchestrator, config: &Config, json: bool) -> anyhow::Result<()> {
    let stdin = io::stdin();
    print!("> ");
    io::stdout().flush()?;
    for line in stdin.lock().lines() {
        let line = line?;
        if line.trim().is_empty() {
            print!("> ");
            io::stdout().flush()?;
            continue;
        }
        run_one(orchestrator, config, &line, json).await;
        print!("> ");
        io::stdout().flush()?;
    }
    Ok(())
}

async fn run_list(store: &Store) -> anyhow::Result<()> {
    match store.list_tasks().await {
        Ok(tasks) => {
            if tasks.is_empty() {
                println!("no tasks persisted yet");
            } else {
                for task in &tasks {
                    match task.parent_id {
                        Some(parent) => println!("  {} \"{}\" (parent: {})", task.id, task.title, parent),
                        None => println!("  {} \"{}\"", task.id, task.title),
                    }
                }
            }
            Ok(())
        }
        Err(e) => {
            eprintln!("✗ could not list tasks: {e}");
            std::process::exit(1);
        }
    }
}

async fn run_delete(backend: &Arc<dyn CalendarBackend>, store: &Store, id: &str) -> anyhow::Result<()> {
    let task_id = match Uuid::parse_str(id) {
        Ok(id) => id,
        Err(_) => {
            eprintln!("✗ {id:?} is not a valid task id");
            std::process::exit(1);
        }
    };
    match event_creator::delete_by_task_id(backend, store, task_id).await {
        Ok(n) => {
            println!("✓ deleted {n} backend event(s) and the associated row(s)");
            Ok(())
        }
        Err(e) => {
            eprintln!("✗ delete failed: {e}");
            std::process::exit(e.exit_code());
        }
    }
}

async fn run_delete_parent(backend: &Arc<dyn CalendarBackend>, store: &Store, id: &str) -> anyhow::Result<()> {
    let parent_id = match Uuid::parse_str(id) {
        Ok(id) => id,
        Err(_) => {
            eprintln!("✗ {id:?} is not a valid task id");
            std::process::exit(1);
        }
    };
    match event_creator::delete_by_parent_id(backend, store, parent_id).await {
        Ok(n) => {
            println!("✓ deleted {n} child event(s), parent row kept");
            Ok(())
        }
        Err(e) => {
            eprintln!("✗ delete failed: {e}");
            std::process::exit(e.exit_code());
        }
    }
}

async fn run_delete_all(backend: &Arc<dyn CalendarBackend>, store: &Store) -> anyhow::Result<()> {
    print!("This deletes every persisted task and backend event. Type \"yes\" to confirm: ");
    io::stdout().flush()?;
    let mut confirmation = String::new();
    io::stdin().read_line(&mut confirmation)?;
    if confirmation.trim() != "yes" {
        println!("aborted");
        return Ok(());
    }
    match event_creator::delete_all(backend, store).await {
        Ok(n) => {
            println!("✓ deleted {n} backend event(s) and all rows");
            Ok(())
        }
        Err(e) => {
            eprintln!("✗ delete-all failed: {e}");
            std::process::exit(e.exit_code());
        }
    }
}
