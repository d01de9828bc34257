//! Batch input reading.

use std::path::Path;

use anyhow::{Context, Result};
use log::info;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};

use crate::app::{is_url_line, validate_url};

/// URLs accepted from the command line and input file, plus how many were rejected.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BatchInput {
    pub urls: Vec<String>,
    pub skipped: usize,
}

impl BatchInput {
    fn push(&mut self, line: &str) {
        if !is_url_line(line) {
            return;
        }
        match validate_url(line) {
            Some(url) => self.urls.push(url),
            None => self.skipped += 1,
        }
    }
}

/// Collects URLs from positional arguments, then from `input` (`-` is stdin).
pub async fn collect_urls(positional: &[String], input: Option<&Path>) -> Result<BatchInput> {
    let mut batch = BatchInput::default();
    for url in positional {
        batch.push(url);
    }

    match input {
        Some(path) if path.as_os_str() == "-" => {
            info!("Reading URLs from stdin");
            read_lines(BufReader::new(tokio::io::stdin()), &mut batch).await?;
        }
        Some(path) => {
            let file = tokio::fs::File::open(path)
                .await
                .with_context(|| format!("Failed to open input file {}", path.display()))?;
            read_lines(BufReader::new(file), &mut batch).await?;
        }
        None => {}
    }

    info!(
        "Loaded {} URL(s), skipped {} invalid",
        batch.urls.len(),
        batch.skipped
    );
    Ok(batch)
}

async fn read_lines<R>(reader: R, batch: &mut BatchInput) -> Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    while let Some(line) = lines
        .next_line()
        .await
        .context("Failed to read input line")?
    {
        batch.push(&line);
    }
    Ok(())
}
