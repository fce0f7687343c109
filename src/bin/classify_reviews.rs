use anyhow::{bail, Context};
use review_guard_lib::models::{Decision, ReviewRecord, Verdict};
use review_guard_lib::services::config_store::{AppConfig, ConfigStore};
use review_guard_lib::services::moderation::llm_judge::describe_request;
use review_guard_lib::services::moderation::BatchError;
use review_guard_lib::{build_pipeline, init_logging};
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;

const RETRY_BACKOFF_MS: u64 = 400;

fn parse_arg_value(args: &[String], key: &str) -> Option<String> {
    args.iter()
        .position(|a| a == key)
        .and_then(|i| args.get(i + 1))
        .cloned()
}

fn has_flag(args: &[String], key: &str) -> bool {
    args.iter().any(|a| a == key)
}

fn preview(s: &str, max_chars: usize) -> String {
    let mut out: String = s.chars().take(max_chars).collect();
    if s.chars().count() > max_chars {
        out.push_str("...");
    }
    out.replace('\n', " ")
}

/// Accepts a single JSON object, a JSON array of objects, or JSON lines.
fn parse_reviews(content: &str) -> anyhow::Result<Vec<ReviewRecord>> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }

    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        return match value {
            Value::Array(items) => Ok(items.into_iter().map(ReviewRecord::from_value).collect()),
            Value::Object(_) => Ok(vec![ReviewRecord::from_value(value)]),
            _ => bail!("expected a JSON object or array of objects"),
        };
    }

    trimmed
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            serde_json::from_str::<Value>(line)
                .map(ReviewRecord::from_value)
                .with_context(|| format!("invalid JSON on line {}", i + 1))
        })
        .collect()
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Outcome {
    index: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    verdict: Option<Verdict>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_kind: Option<&'static str>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Output {
    file: String,
    model: String,
    total: usize,
    relevant: usize,
    not_relevant: usize,
    failed: usize,
    results: Vec<Outcome>,
}

fn init_config(path: Option<String>) -> anyhow::Result<()> {
    let dir = match path {
        Some(p) => p.into(),
        None => ConfigStore::default_config_dir().context("no config directory on this platform")?,
    };
    let store = ConfigStore::new(dir);
    store.save(&AppConfig::default())?;
    println!("Wrote default config: {}", store.config_file().display());
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().collect();

    if has_flag(&args, "--init-config") {
        return init_config(parse_arg_value(&args, "--config-dir"));
    }

    let describe_only = has_flag(&args, "--describe-judge");
    if args.len() < 2 || (args[1].starts_with("--") && !describe_only) {
        eprintln!(
            "Usage:\n  classify_reviews <reviews.json|reviews.jsonl> [--concurrency <n>] [--retries <n>] [--out <json_path>]\n  classify_reviews --describe-judge\n  classify_reviews --init-config [--config-dir <dir>]\n\nNotes:\n  - Input may be one review object, an array of reviews, or one review per line.\n  - Only judge timeouts and transport errors are retried; task failures are not."
        );
        return Ok(());
    }

    init_logging();
    let config = review_guard_lib::services::config_store::load_app_config();

    if describe_only {
        println!("{}", serde_json::to_string_pretty(&describe_request(&config.judge))?);
        return Ok(());
    }

    let path = args[1].clone();
    let concurrency: usize = parse_arg_value(&args, "--concurrency")
        .and_then(|s| s.parse().ok())
        .unwrap_or(4);
    let retries: u32 = parse_arg_value(&args, "--retries")
        .and_then(|s| s.parse().ok())
        .unwrap_or(0);
    let out_path = parse_arg_value(&args, "--out");

    let content = std::fs::read_to_string(&path).with_context(|| format!("read file failed: {}", path))?;
    let reviews = parse_reviews(&content)?;

    let pipeline = build_pipeline(&config)?;

    println!("File: {}", path);
    println!("Reviews: {}", reviews.len());
    println!("Model: {}", pipeline.model_id());
    println!("Concurrency: {}  Retries: {}", concurrency, retries);
    println!();

    let mut results = pipeline.classify_batch(reviews.clone(), concurrency).await;

    for attempt in 1..=retries {
        let pending: Vec<usize> = results
            .iter()
            .enumerate()
            .filter(|(_, r)| matches!(r, Err(e) if e.is_retryable()))
            .map(|(i, _)| i)
            .collect();
        if pending.is_empty() {
            break;
        }

        tokio::time::sleep(Duration::from_millis(RETRY_BACKOFF_MS * attempt as u64)).await;
        println!("Retry {}: {} reviews", attempt, pending.len());

        let batch: Vec<ReviewRecord> = pending.iter().map(|&i| reviews[i].clone()).collect();
        let retried = pipeline.classify_batch(batch, concurrency).await;
        for (idx, outcome) in pending.into_iter().zip(retried) {
            results[idx] = outcome;
        }
    }

    let mut outcomes = Vec::with_capacity(results.len());
    for (index, result) in results.into_iter().enumerate() {
        let text = reviews[index].text().to_string();
        match result {
            Ok(verdict) => {
                println!(
                    "[R{:04}] {:<12} conf={:.2} by={:<11} {}",
                    index,
                    verdict.final_decision.as_str(),
                    verdict.confidence,
                    verdict.decided_by.as_str(),
                    preview(&text, 100)
                );
                outcomes.push(Outcome {
                    index,
                    verdict: Some(verdict),
                    error: None,
                    error_kind: None,
                });
            }
            Err(e) => {
                println!("[R{:04}] error        {}  {}", index, e.kind(), preview(&text, 100));
                outcomes.push(failed(index, &e));
            }
        }
    }

    let relevant = outcomes
        .iter()
        .filter(|o| o.verdict.as_ref().map_or(false, |v| v.final_decision == Decision::Relevant))
        .count();
    let failed_count = outcomes.iter().filter(|o| o.error.is_some()).count();
    let total = outcomes.len();

    println!();
    println!(
        "Summary: total={} relevant={} not_relevant={} failed={}",
        total,
        relevant,
        total - relevant - failed_count,
        failed_count
    );

    if let Some(out_path) = out_path {
        let out = Output {
            file: path,
            model: pipeline.model_id().to_string(),
            total,
            relevant,
            not_relevant: total - relevant - failed_count,
            failed: failed_count,
            results: outcomes,
        };
        let json = serde_json::to_string_pretty(&out)?;
        std::fs::write(&out_path, json).with_context(|| format!("write out failed: {}", out_path))?;
        println!("Wrote JSON: {}", out_path);
    }

    Ok(())
}

fn failed(index: usize, e: &BatchError) -> Outcome {
    Outcome {
        index,
        verdict: None,
        error: Some(e.to_string()),
        error_kind: Some(e.kind()),
    }
}
