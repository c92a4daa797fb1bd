use std::path::Path;
use std::process::Command;

use vframes_media::{EphemeralPath, FfmpegDecoder};
use vframes_storage::S3Config;
use vframes_worker::WorkerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = WorkerConfig::from_env()?;

    println!(
        "worker-selfcheck: starting with work_dir={}",
        config.work_dir.display()
    );
    ensure_workdir(&config.work_dir).await?;
    ensure_ffmpeg()?;
    ensure_env_present(&["REDIS_URL"])?;
    S3Config::from_env()?;

    println!("worker-selfcheck: ok");
    Ok(())
}

async fn ensure_workdir(path: &Path) -> anyhow::Result<()> {
    tokio::fs::create_dir_all(path).await?;
    let probe = EphemeralPath::create_file(path, ".selfcheck-", "")
        .map_err(|e| anyhow::anyhow!("work dir {} is not writable: {}", path.display(), e))?;
    probe.cleanup();
    Ok(())
}

fn ensure_ffmpeg() -> anyhow::Result<()> {
    FfmpegDecoder::check_available()?;

    for binary in ["ffmpeg", "ffprobe"] {
        let output = Command::new(binary)
            .arg("-version")
            .output()
            .map_err(|e| anyhow::anyhow!("{} not available: {}", binary, e))?;

        if !output.status.success() {
            return Err(anyhow::anyhow!(
                "{} -version failed: {:?}",
                binary,
                output.status
            ));
        }
    }
    Ok(())
}

fn ensure_env_present(vars: &[&str]) -> anyhow::Result<()> {
    for var in vars {
        if std::env::var(var).is_err() {
            return Err(anyhow::anyhow!("missing required env var {}", var));
        }
    }
    Ok(())
}
