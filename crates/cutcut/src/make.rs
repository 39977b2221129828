//! One-shot sticker creation.

use std::str::FromStr;

use cutcut_io::Driver;
use cutcut_pipeline::{DOWNLOAD_FILENAME, Inbound, Outbound, Settings};
use tracing::{debug, info};

use crate::PipelineArgs;

/// Arguments of `cutcut make`.
#[derive(clap::Args)]
pub struct MakeArgs {
    /// Image to turn into a sticker: a path, `file://`, `http(s)://`, or
    /// `data:` URL.
    input: String,

    /// Crop rectangle in working-resolution pixels, as `X,Y,WIDTH,HEIGHT`.
    #[arg(long)]
    crop: Option<Rect>,

    /// Constrain the crop to this width/height ratio.
    #[arg(long)]
    aspect: Option<f32>,

    /// Send the crop to the background-removal service.
    #[arg(long)]
    remove_bg: bool,

    /// Erase along a brush stroke, as `X,Y;X,Y;...` in cropped-image
    /// pixels. A single point erases a dot. Repeatable.
    #[arg(long = "erase", value_name = "POINTS")]
    erase: Vec<Stroke>,

    /// Text overlay. Repeatable; requires `--font`.
    #[arg(long = "text", value_name = "TEXT")]
    text: Vec<String>,

    /// Add the sticker to the configured Telegram pack instead of saving it.
    #[arg(long)]
    upload: bool,

    #[command(flatten)]
    pipeline: PipelineArgs,
}

/// `X,Y,WIDTH,HEIGHT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    x: u32,
    y: u32,
    width: u32,
    height: u32,
}

impl FromStr for Rect {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts = s
            .split(',')
            .map(|p| p.trim().parse::<u32>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| format!("invalid rectangle {s:?}: {e}"))?;
        match parts.as_slice() {
            &[x, y, width, height] => Ok(Self {
                x,
                y,
                width,
                height,
            }),
            _ => Err(format!("rectangle {s:?} must be X,Y,WIDTH,HEIGHT")),
        }
    }
}

/// A brush stroke: one or more points.
#[derive(Debug, Clone, PartialEq)]
pub struct Stroke(Vec<(f32, f32)>);

impl FromStr for Stroke {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let points = s
            .split(';')
            .filter(|p| !p.trim().is_empty())
            .map(|p| -> Result<(f32, f32), String> {
                let (x, y) = p
                    .split_once(',')
                    .ok_or_else(|| format!("point {p:?} must be X,Y"))?;
                let x = x.trim().parse::<f32>().map_err(|e| format!("point {p:?}: {e}"))?;
                let y = y.trim().parse::<f32>().map_err(|e| format!("point {p:?}: {e}"))?;
                Ok((x, y))
            })
            .collect::<Result<Vec<_>, String>>()?;
        if points.is_empty() {
            return Err(format!("stroke {s:?} has no points"));
        }
        Ok(Self(points))
    }
}

impl Stroke {
    fn messages(&self) -> Vec<Inbound> {
        let mut points = self.0.iter();
        let mut messages = Vec::with_capacity(self.0.len() + 1);
        if let Some(&(x, y)) = points.next() {
            messages.push(Inbound::PointerDown { x, y });
        }
        messages.extend(points.map(|&(x, y)| Inbound::PointerMove { x, y }));
        messages.push(Inbound::PointerUp);
        messages
    }
}

/// Send `message`, wait for every effect it started, and fail on the
/// first reported error.
async fn step(driver: &mut Driver, message: Inbound) -> Result<Vec<Outbound>, String> {
    let name = message.name();
    let mut outbound = driver.handle(message).await;
    outbound.extend(driver.settle().await);
    for msg in &outbound {
        debug!(step = name, ?msg, "outbound");
        if let Outbound::ErrorReported { kind, message } = msg {
            return Err(format!("{name} failed ({kind}): {message}"));
        }
    }
    Ok(outbound)
}

pub async fn run(args: &MakeArgs, settings: Option<Settings>) -> Result<(), String> {
    let mut driver = args.pipeline.driver()?;

    step(&mut driver, Inbound::SettingsChanged { settings }).await?;
    step(
        &mut driver,
        Inbound::CropImageInit {
            img_url: args.input.clone(),
        },
    )
    .await?;

    if let Some(ratio) = args.aspect {
        step(
            &mut driver,
            Inbound::SetAspectRatio { ratio: Some(ratio) },
        )
        .await?;
    }
    if let Some(rect) = args.crop {
        step(
            &mut driver,
            Inbound::SetCropRect {
                x: rect.x,
                y: rect.y,
                width: rect.width,
                height: rect.height,
            },
        )
        .await?;
    }
    step(&mut driver, Inbound::CropImage).await?;

    step(
        &mut driver,
        Inbound::PrepareForErase {
            remove_bg: args.remove_bg,
            base64img: String::new(),
        },
    )
    .await?;
    for stroke in &args.erase {
        for message in stroke.messages() {
            step(&mut driver, message).await?;
        }
    }
    step(&mut driver, Inbound::AddImgFinish).await?;

    for content in &args.text {
        step(
            &mut driver,
            Inbound::AddText {
                content: content.clone(),
            },
        )
        .await?;
    }

    if args.upload {
        let outbound = step(&mut driver, Inbound::RequestUploadToPack).await?;
        return outbound
            .into_iter()
            .find_map(|msg| match msg {
                Outbound::StickerUploadedSuccess => Some(Ok(())),
                Outbound::StickerUploadedFailure { code, description } => Some(Err(format!(
                    "Upload rejected ({}): {}",
                    code.map_or_else(|| "no code".to_owned(), |c| c.to_string()),
                    description.as_deref().unwrap_or("no description"),
                ))),
                _ => None,
            })
            .unwrap_or_else(|| Err("Upload finished without a reply".to_owned()))
            .inspect(|_| info!("sticker added to pack"));
    }

    step(&mut driver, Inbound::DownloadSticker).await?;
    let path = args.pipeline.out_dir.join(DOWNLOAD_FILENAME);
    println!("{}", path.display());
    Ok(())
}
