//! rag-chat: terminal front end for the RAG query service.
//! Reads config, takes a question from the arguments or stdin, streams the
//! answer to stdout, then prints citations and the latency breakdown.

use rag_client::{config, store, ApiClient, Session, StreamUpdate, SubmitOutcome};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process;

fn parse_args() -> (Option<PathBuf>, Option<String>) {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let mut config_path = None;
    let mut question = None;
    let mut iter = args.into_iter();
    while let Some(arg) = iter.next() {
        if arg == "--config" {
            config_path = iter.next().map(PathBuf::from);
        } else {
            question = Some(arg);
        }
    }
    (config_path, question)
}

fn resolve_config_path(override_path: Option<PathBuf>) -> PathBuf {
    // 1. --config <path> flag
    if let Some(path) = override_path {
        return path;
    }
    // 2. RAG_CHAT_CONFIG env var
    if let Ok(val) = std::env::var("RAG_CHAT_CONFIG") {
        return PathBuf::from(val);
    }
    // 3. Default path (~/.rag-chat/config.yaml)
    config::default_config_path().unwrap_or_else(|| {
        eprintln!("Error: unable to determine config path (set --config or RAG_CHAT_CONFIG)");
        process::exit(1);
    })
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let (config_override, question_arg) = parse_args();
    let config_path = resolve_config_path(config_override);

    let cfg = match config::load(&config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!(
                "Error: failed to load config from {}: {}",
                config_path.display(),
                e
            );
            process::exit(1);
        }
    };

    let base_url = cfg
        .api
        .base_url
        .unwrap_or_else(|| config::DEFAULT_BASE_URL.to_string());
    let conversations_path = cfg
        .storage
        .conversations_path
        .map(PathBuf::from)
        .or_else(store::default_conversations_path)
        .unwrap_or_else(|| {
            eprintln!("Error: unable to determine conversations path");
            process::exit(1);
        });

    // Question from the positional argument, or the first stdin line.
    let question = question_arg.unwrap_or_else(|| {
        let stdin = io::stdin();
        let mut line = String::new();
        stdin.lock().read_line(&mut line).unwrap_or(0);
        line.trim().to_string()
    });

    if question.is_empty() {
        eprintln!("Error: no question provided");
        process::exit(1);
    }

    // Run the query on a tokio runtime.
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap_or_else(|e| {
            eprintln!("Error: failed to create runtime: {}", e);
            process::exit(1);
        });

    rt.block_on(async {
        let api = ApiClient::new(base_url);
        let session = Session::new(api, store::open_file_store(&conversations_path));

        let stdout = io::stdout();
        let mut printed = 0usize;
        let mut observer = |update: &StreamUpdate| {
            let mut out = stdout.lock();
            match update {
                StreamUpdate::Content(so_far) => {
                    let _ = write!(out, "{}", &so_far[printed..]);
                    let _ = out.flush();
                    printed = so_far.len();
                }
                StreamUpdate::Error(text) => {
                    let _ = writeln!(out);
                    let _ = writeln!(out, "{}", text);
                    let _ = out.flush();
                }
            }
        };

        match session.submit(&question, &mut observer).await {
            SubmitOutcome::Completed(message) => {
                let mut out = stdout.lock();
                let _ = writeln!(out);
                if let Some(sources) = &message.sources {
                    let _ = writeln!(out, "\nSources:");
                    for citation in sources {
                        let _ = writeln!(out, "  {}", citation.source);
                    }
                }
                if let Some(timing) = &message.timing {
                    match timing.display_total_ms() {
                        Some(total) => {
                            let _ = writeln!(out, "\nLatency: {}ms", total);
                        }
                        None => {
                            let _ = writeln!(out, "\nLatency:");
                        }
                    }
                    for (stage, duration) in &timing.breakdown {
                        let _ = writeln!(out, "  {}: {}ms", stage, duration);
                    }
                }
            }
            SubmitOutcome::Failed(reason) => {
                eprintln!("Error: query failed: {}", reason);
                process::exit(1);
            }
            SubmitOutcome::Rejected => {
                eprintln!("Error: query rejected");
                process::exit(1);
            }
        }
    });
}
