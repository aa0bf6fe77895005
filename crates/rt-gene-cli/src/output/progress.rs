//! Download progress bar using indicatif.

use std::io::IsTerminal;
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use rt_gene_adapters::ProgressCallback;

/// Creates a byte progress bar and a callback feeding it.
///
/// The bar is hidden when stderr is not a terminal.
pub fn download_progress() -> Result<(Arc<ProgressBar>, ProgressCallback)> {
    let pb = if std::io::stderr().is_terminal() {
        ProgressBar::new(0)
    } else {
        ProgressBar::hidden()
    };
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta}) {msg}")
            .map_err(|e| anyhow::anyhow!("Invalid progress template: {e}"))?
            .progress_chars("#>-"),
    );
    let pb = Arc::new(pb);

    let current: Arc<Mutex<String>> = Arc::new(Mutex::new(String::new()));
    let bar = Arc::clone(&pb);

    let progress: ProgressCallback =
        Box::new(move |name: &str, downloaded: u64, total: Option<u64>| {
            let is_new = {
                let mut current = current.lock().unwrap_or_else(PoisonError::into_inner);
                if *current == name {
                    false
                } else {
                    *current = name.to_string();
                    true
                }
            };
            if is_new {
                bar.reset();
                if let Some(t) = total {
                    bar.set_length(t);
                }
                bar.set_message(name.to_string());
            }
            bar.set_position(downloaded);
        });

    Ok((pb, progress))
}

/// Runs `work` and clears `bar` afterwards, whether or not it succeeded.
pub fn clear_after<T>(bar: &ProgressBar, work: impl FnOnce() -> T) -> T {
    let out = work();
    bar.finish_and_clear();
    out
}
