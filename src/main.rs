// sitemirror CLI: mirror a site into a local directory.
//
// Usage: sitemirror <url> [output-dir] [--depth N] [--max-files N]
//        [--no-cache] [--headful] [--external]

use anyhow::{anyhow, Result};
use sitemirror::{CloneConfig, CloneEvent, Orchestrator};

fn print_usage() {
    eprintln!(
        "Usage: sitemirror <url> [output-dir] [options]\n\
         \n\
         Options:\n\
         \x20 --depth <n>      crawl depth (default 3, max 5)\n\
         \x20 --max-files <n>  stop after downloading n files\n\
         \x20 --no-cache       disable the download cache\n\
         \x20 --headful        run the browser with a visible window\n\
         \x20 --external       follow links to other origins"
    );
}

fn parse_args() -> Result<CloneConfig> {
    let mut args = std::env::args().skip(1);
    let mut url: Option<String> = None;
    let mut output: Option<String> = None;
    let mut depth: u32 = 3;
    let mut max_files: Option<usize> = None;
    let mut cache_enabled = true;
    let mut headless = true;
    let mut external = false;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--depth" => {
                depth = args
                    .next()
                    .ok_or_else(|| anyhow!("--depth needs a value"))?
                    .parse()?;
            }
            "--max-files" => {
                max_files = Some(
                    args.next()
                        .ok_or_else(|| anyhow!("--max-files needs a value"))?
                        .parse()?,
                );
            }
            "--no-cache" => cache_enabled = false,
            "--headful" => headless = false,
            "--external" => external = true,
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            other if url.is_none() => url = Some(other.to_string()),
            other if output.is_none() => output = Some(other.to_string()),
            other => return Err(anyhow!("Unexpected argument: {other}")),
        }
    }

    let url = url.ok_or_else(|| {
        print_usage();
        anyhow!("Missing start URL")
    })?;

    let mut builder = CloneConfig::builder()
        .output_root(output.unwrap_or_else(|| "./mirror".to_string()))
        .start_url(url)
        .max_depth(depth)
        .follow_external_links(external)
        .browser(headless, 1366, 900);
    if let Some(limit) = max_files {
        builder = builder.max_files(limit);
    }
    if !cache_enabled {
        builder = builder.cache(false, 0);
    }
    builder.build()
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = parse_args()?;
    let orchestrator = Orchestrator::new(config).await?;

    // Print the event stream as human-readable progress lines.
    let mut events = orchestrator.events().subscribe();
    let printer = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                CloneEvent::StatusUpdate {
                    status, progress, ..
                } => println!("[{progress:5.1}%] status: {status}"),
                CloneEvent::PayloadAnalysisComplete {
                    total_assets,
                    total_bytes,
                    critical_count,
                    estimated_seconds,
                    ..
                } => println!(
                    "analysis: {total_assets} assets expected ({total_bytes} bytes, {critical_count} critical, ~{estimated_seconds}s)"
                ),
                CloneEvent::AssetFound { asset, .. } => {
                    log::debug!("asset found: {} ({})", asset.url, asset.asset_type);
                }
                CloneEvent::CompletenessVerificationComplete {
                    completeness_percent,
                    quality_score,
                    missing,
                    failed,
                    recovered,
                    ..
                } => println!(
                    "verification: {completeness_percent:.1}% complete (quality {quality_score:.1}, {missing} missing, {failed} failed, {recovered} recovered)"
                ),
                CloneEvent::SymlinksCreated { count, .. } => {
                    println!("created {count} path aliases");
                }
                CloneEvent::Error { kind, message, .. } => {
                    eprintln!("error [{kind}]: {message}");
                }
                _ => {}
            }
        }
    });

    orchestrator.announce_recoverable().await;

    let outcome = orchestrator.run().await?;
    printer.abort();

    println!(
        "\nMirrored {} pages and {}/{} assets into {}",
        outcome.pages,
        outcome.assets.downloaded,
        outcome.assets.total,
        outcome.output_dir.display()
    );
    if let Some(verification) = &outcome.verification {
        println!(
            "Completeness {:.1}%, quality {:.1}",
            verification.completeness_percent, verification.quality_score
        );
    }

    Ok(())
}
