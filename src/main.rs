use std::fs::File;
use std::io::BufReader;
use std::io::BufWriter;
use std::sync::Arc;

use diskkv::Entry;
use diskkv::Error;
use diskkv::KvRecord;
use diskkv::Query;
use diskkv::QueryResult;
use diskkv::Result;
use diskkv::RocksDBStateMachine;
use diskkv::Settings;
use diskkv::StateMachine;
use tokio::io::AsyncBufReadExt;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::error;
use tracing::info;
use tracing_subscriber::EnvFilter;

const HELP: &str = "commands: put <key> <value> | get <key> | index | hash | save <file> | restore <file> | quit";

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    init_observability();

    let settings = Settings::new()?.validate()?;
    let sm = Arc::new(RocksDBStateMachine::new(
        settings.node.shard_id,
        settings.node.replica_id,
        &settings.storage,
    ));
    let applied_index = exit_on_fatal(sm.open())?;
    info!(applied_index, root = ?sm.node_root(), "state machine ready");

    // Initializing Shutdown Signal
    let shutdown = CancellationToken::new();
    tokio::spawn(graceful_shutdown(shutdown.clone()));

    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    println!("{HELP}");
    loop {
        let line = tokio::select! {
            _ = shutdown.cancelled() => break,
            line = lines.next_line() => line?,
        };
        let Some(line) = line else {
            break;
        };
        let words: Vec<&str> = line.split_whitespace().collect();
        if words.first() == Some(&"quit") {
            break;
        }

        let reply = match execute(&sm, &words, shutdown.child_token()).await {
            Ok(reply) => reply,
            Err(e) if e.is_fatal() => {
                error!("fatal error, terminating: {:?}", e);
                std::process::exit(1);
            }
            Err(e) => format!("error: {e}"),
        };
        stdout.write_all(format!("{reply}\n").as_bytes()).await?;
        stdout.flush().await?;
    }

    exit_on_fatal(sm.close())?;
    println!("Exiting program.");
    Ok(())
}

async fn execute(
    sm: &Arc<RocksDBStateMachine>,
    words: &[&str],
    stop: CancellationToken,
) -> Result<String> {
    match words {
        ["put", key, value] => {
            let record = KvRecord::new(*key, *value);
            let index = sm.last_applied() + 1;
            sm.update(vec![Entry::new(index, record.encode()?)])?;
            Ok(format!("applied at {index}"))
        }
        ["get", key] => match sm.lookup(Query::get(*key))? {
            QueryResult::Value(v) => Ok(v),
            _ => Ok("(not found)".to_string()),
        },
        ["index"] => Ok(sm.last_applied().to_string()),
        ["hash"] => Ok(format!("{:016x}", sm.get_hash()?)),
        ["save", path] => {
            let ctx = sm.prepare_snapshot()?;
            let (sm, path) = (sm.clone(), path.to_string());
            run_blocking(move || {
                let mut w = BufWriter::new(File::create(&path)?);
                sm.save_snapshot(ctx, &mut w, &stop)?;
                Ok(format!("snapshot saved to {path}"))
            })
            .await
        }
        ["restore", path] => {
            let (sm, path) = (sm.clone(), path.to_string());
            run_blocking(move || {
                let mut r = BufReader::new(File::open(&path)?);
                sm.recover_from_snapshot(&mut r, &stop)?;
                Ok(format!("recovered to index {}", sm.last_applied()))
            })
            .await
        }
        _ => Ok(HELP.to_string()),
    }
}

/// Runs snapshot transfer off the console task so Ctrl-C can still cancel it.
async fn run_blocking<F>(f: F) -> Result<String>
where
    F: FnOnce() -> Result<String> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| Error::from(std::io::Error::other(e)))?
}

fn exit_on_fatal<T>(result: Result<T>) -> Result<T> {
    if let Err(e) = &result {
        if e.is_fatal() {
            error!("fatal error, terminating: {:?}", e);
            std::process::exit(1);
        }
    }
    result
}

async fn graceful_shutdown(shutdown: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl+C: {}", e);
        return;
    }
    info!("Ctrl+C detected.");
    shutdown.cancel();
}

fn init_observability() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();
}
