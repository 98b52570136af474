//! Transaction Generator
//!
//! Writes demo transactions as JSON lines to stdout, ready to be piped into
//! the screening service. Progress logs go to stderr.

use chrono::Utc;
use rand::Rng;
use sentinel_screening::demo::DemoGenerator;
use std::io::Write;
use std::time::Duration;
use tracing::info;
use uuid::Uuid;

/// Fraud rate argument as a probability. Missing, unparseable and non-finite
/// values fall back to 0.1.
fn parse_fraud_rate(arg: Option<&str>) -> f64 {
    arg.and_then(|s| s.parse().ok())
        .filter(|r: &f64| r.is_finite())
        .unwrap_or(0.1)
        .clamp(0.0, 1.0)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("generate_transactions=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    // Parse arguments
    let args: Vec<String> = std::env::args().collect();
    let count: u64 = args.get(1).and_then(|s| s.parse().ok()).unwrap_or(100);
    let fraud_rate = parse_fraud_rate(args.get(2).map(String::as_str));
    let delay_ms: u64 = args.get(3).and_then(|s| s.parse().ok()).unwrap_or(0);

    info!(
        count = count,
        fraud_rate = fraud_rate,
        delay_ms = delay_ms,
        "Starting transaction generator"
    );

    let mut generator = DemoGenerator::from_entropy(Utc::now());
    let mut rng = rand::thread_rng();
    let stdout = std::io::stdout();

    let mut legitimate_count = 0;
    let mut suspicious_count = 0;

    for i in 0..count {
        // Suspicious ones are unlabelled so the scorer has to catch them
        let mut transaction = if rng.gen_bool(fraud_rate) {
            suspicious_count += 1;
            generator.threat(false)
        } else {
            legitimate_count += 1;
            generator.legitimate()
        };
        transaction.transaction_id = format!("gen_{}", Uuid::new_v4().simple());

        let line = serde_json::to_string(&transaction)?;
        {
            let mut out = stdout.lock();
            writeln!(out, "{line}")?;
            out.flush()?;
        }

        if (i + 1) % 100 == 0 {
            info!(
                "Generated {}/{} transactions ({} legitimate, {} suspicious)",
                i + 1,
                count,
                legitimate_count,
                suspicious_count
            );
        }

        if delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        }
    }

    info!(
        "Completed! Generated {} transactions ({} legitimate, {} suspicious)",
        count, legitimate_count, suspicious_count
    );

    Ok(())
}
