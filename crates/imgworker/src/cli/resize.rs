//! The `imgworker resize` command: run the job pipeline once on a local file.

use clap::Args;
use imgworker_core::{Config, ImgWorker, Payload, PipelineOutcome};
use std::io::Write;
use std::path::{Path, PathBuf};

use super::PipelineOverrides;

/// Arguments for the `resize` command.
#[derive(Args, Debug)]
pub struct ResizeArgs {
    /// Image file to process
    #[arg(required = true)]
    pub input: PathBuf,

    /// Output identifier (defaults to the input file stem)
    #[arg(long)]
    pub id: Option<String>,

    /// Where to write the encoded bytes in bytes mode (defaults to stdout)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    #[command(flatten)]
    pub overrides: PipelineOverrides,
}

/// Execute the resize command.
pub async fn execute(args: ResizeArgs, config: Config) -> anyhow::Result<()> {
    let config = args.overrides.apply(config)?;
    let app = ImgWorker::new(config)?;

    let payload = tokio::fs::read(&args.input).await?;
    let output_id = match args.id {
        Some(id) => id,
        None => default_output_id(&args.input)?,
    };

    match app.process_bytes(payload, &output_id).await {
        PipelineOutcome::Delivered(delivered) => {
            tracing::info!(
                "Compressed and resized {} to {}x{} {}",
                output_id,
                delivered.width,
                delivered.height,
                delivered.format
            );
            match delivered.payload {
                Payload::Bytes(bytes) => match &args.output {
                    Some(path) => {
                        tokio::fs::write(path, &bytes).await?;
                        tracing::info!("Output written to {:?}", path);
                    }
                    None => {
                        let mut stdout = std::io::stdout().lock();
                        stdout.write_all(&bytes)?;
                        stdout.flush()?;
                    }
                },
                Payload::Path(path) => println!("{}", path.display()),
            }
            Ok(())
        }
        PipelineOutcome::Failed(e) => {
            anyhow::bail!("Processing {} failed [{}]: {}", output_id, e.kind(), e)
        }
    }
}

fn default_output_id(input: &Path) -> anyhow::Result<String> {
    input
        .file_stem()
        .and_then(|s| s.to_str())
        .map(String::from)
        .ok_or_else(|| anyhow::anyhow!("Cannot derive an output id from {:?}; pass --id", input))
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::super::SinkArg;

    #[test]
    fn output_id_from_file_stem() {
        assert_eq!(default_output_id(Path::new("/a/b/cat.photo.jpg")).unwrap(), "cat.photo");
        assert!(default_output_id(Path::new("/")).is_err());
    }

    #[tokio::test]
    async fn resize_writes_output_file() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.png");
        image::RgbaImage::from_pixel(64, 32, image::Rgba([10, 20, 30, 255]))
            .save(&input)
            .unwrap();
        let output = dir.path().join("out.png");

        let args = ResizeArgs {
            input,
            id: None,
            output: Some(output.clone()),
            overrides: PipelineOverrides {
                max_size: Some(16),
                ..PipelineOverrides::default()
            },
        };
        execute(args, Config::default()).await.unwrap();

        let result = image::open(&output).unwrap();
        assert_eq!((result.width(), result.height()), (16, 8));
    }

    #[tokio::test]
    async fn resize_path_sink_stores_named_file() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.png");
        image::RgbaImage::from_pixel(20, 40, image::Rgba([0, 0, 0, 255]))
            .save(&input)
            .unwrap();
        let out_dir = dir.path().join("out");

        let args = ResizeArgs {
            input,
            id: Some("portrait".to_string()),
            output: None,
            overrides: PipelineOverrides {
                max_size: Some(10),
                sink: Some(SinkArg::Path),
                output_dir: Some(out_dir.clone()),
                jpeg_quality: None,
            },
        };
        execute(args, Config::default()).await.unwrap();
        assert!(out_dir.join("portrait.png").exists());
    }

    #[tokio::test]
    async fn resize_reports_decode_failure() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("broken.jpg");
        std::fs::write(&input, b"not really a jpeg").unwrap();

        let args = ResizeArgs {
            input,
            id: None,
            output: Some(dir.path().join("never.jpg")),
            overrides: PipelineOverrides::default(),
        };
        let err = execute(args, Config::default()).await.unwrap_err();
        assert!(err.to_string().contains("[decode]"));
    }
}
