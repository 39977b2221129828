//! Driver runs against in-memory fakes of the remote services.

#![allow(clippy::unwrap_used, clippy::panic)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use image::Rgba;

use cutcut_io::{BackgroundRemover, Driver, IoError, Services, SourceLoader, StickerUploader};
use cutcut_pipeline::asset;
use cutcut_pipeline::{
    DOWNLOAD_FILENAME, ErrorKind, Inbound, Orchestrator, Outbound, PipelineConfig, RgbaImage,
    Settings, Stage, UploadReply, UploadTarget,
};

struct FakeLoader {
    calls: AtomicUsize,
    png: Vec<u8>,
}

#[async_trait]
impl SourceLoader for FakeLoader {
    async fn load(&self, _url: &str) -> Result<Vec<u8>, IoError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.png.clone())
    }
}

struct FakeRemover {
    calls: AtomicUsize,
    fail_with: Option<u16>,
}

#[async_trait]
impl BackgroundRemover for FakeRemover {
    async fn remove_background(
        &self,
        _api_key: &str,
        _image_base64: &str,
    ) -> Result<String, IoError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(status) = self.fail_with {
            return Err(IoError::Status {
                service: "remove.bg",
                status,
                body: "Insufficient credits".into(),
            });
        }
        let cutout = RgbaImage::from_pixel(40, 40, Rgba([10, 200, 10, 255]));
        Ok(asset::encode_base64_png(&cutout).unwrap())
    }
}

struct FakeUploader {
    calls: AtomicUsize,
    last_target: Mutex<Option<UploadTarget>>,
}

#[async_trait]
impl StickerUploader for FakeUploader {
    async fn add_sticker(
        &self,
        target: &UploadTarget,
        png: Vec<u8>,
    ) -> Result<UploadReply, IoError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        assert!(asset::decode(&png).is_ok());
        *self.last_target.lock().unwrap() = Some(target.clone());
        Ok(UploadReply {
            ok: true,
            error_code: None,
            description: None,
        })
    }
}

struct Harness {
    driver: Driver,
    loader: Arc<FakeLoader>,
    remover: Arc<FakeRemover>,
    uploader: Arc<FakeUploader>,
    dir: tempfile::TempDir,
}

fn harness_with(fail_remover: Option<u16>) -> Harness {
    let loader = Arc::new(FakeLoader {
        calls: AtomicUsize::new(0),
        png: asset::encode_png(&RgbaImage::from_pixel(60, 40, Rgba([200, 0, 0, 255]))).unwrap(),
    });
    let remover = Arc::new(FakeRemover {
        calls: AtomicUsize::new(0),
        fail_with: fail_remover,
    });
    let uploader = Arc::new(FakeUploader {
        calls: AtomicUsize::new(0),
        last_target: Mutex::new(None),
    });
    let services = Services {
        loader: loader.clone(),
        remover: remover.clone(),
        uploader: uploader.clone(),
    };
    let dir = tempfile::tempdir().unwrap();
    let orchestrator = Orchestrator::new(PipelineConfig::default()).unwrap();
    let driver = Driver::new(orchestrator, services, dir.path().to_path_buf());
    Harness {
        driver,
        loader,
        remover,
        uploader,
        dir,
    }
}

fn harness() -> Harness {
    harness_with(None)
}

fn photo() -> String {
    asset::encode_data_url(&RgbaImage::from_pixel(80, 60, Rgba([0, 0, 200, 255]))).unwrap()
}

fn settings() -> Settings {
    Settings {
        telegram_bot_token: Some("123:abc".into()),
        telegram_bot_id: Some("42".into()),
        telegram_bot_username: Some("@cut_bot".into()),
        remove_bg_api_key: Some("rbg".into()),
    }
}

fn error_kinds(outbound: &[Outbound]) -> Vec<ErrorKind> {
    outbound
        .iter()
        .filter_map(|m| match m {
            Outbound::ErrorReported { kind, .. } => Some(*kind),
            _ => None,
        })
        .collect()
}

async fn to_erasing(driver: &mut Driver) {
    driver
        .handle(Inbound::CropImageInit { img_url: photo() })
        .await;
    driver.handle(Inbound::CropImage).await;
    assert_eq!(driver.orchestrator().stage(), Stage::Erasing);
}

async fn to_compositing(driver: &mut Driver) {
    to_erasing(driver).await;
    driver
        .handle(Inbound::PrepareForErase {
            remove_bg: false,
            base64img: String::new(),
        })
        .await;
    driver.handle(Inbound::AddImgFinish).await;
    assert_eq!(driver.orchestrator().stage(), Stage::Compositing);
}

#[tokio::test(flavor = "current_thread")]
async fn remote_source_is_loaded_before_cropping() {
    let mut h = harness();
    let out = h
        .driver
        .handle(Inbound::CropImageInit {
            img_url: "https://example.com/photo.png".into(),
        })
        .await;
    assert!(out.is_empty());
    assert_eq!(h.driver.in_flight(), 1);
    assert_eq!(h.driver.orchestrator().stage(), Stage::Idle);

    let out = h.driver.settle().await;
    assert_eq!(h.loader.calls.load(Ordering::SeqCst), 1);
    assert_eq!(
        out,
        vec![Outbound::StageChanged {
            stage: Stage::Cropping
        }]
    );
}

#[tokio::test(flavor = "current_thread")]
async fn remote_erase_goes_through_the_remover() {
    let mut h = harness();
    h.driver
        .handle(Inbound::SettingsChanged {
            settings: Some(settings()),
        })
        .await;
    to_erasing(&mut h.driver).await;

    let out = h
        .driver
        .handle(Inbound::PrepareForErase {
            remove_bg: true,
            base64img: String::new(),
        })
        .await;
    assert!(out.is_empty());

    let out = h.driver.settle().await;
    assert_eq!(h.remover.calls.load(Ordering::SeqCst), 1);
    assert!(matches!(
        out.as_slice(),
        [Outbound::EraseSurfaceReady { .. }]
    ));
}

#[tokio::test(flavor = "current_thread")]
async fn remote_erase_without_key_never_calls_the_service() {
    let mut h = harness();
    to_erasing(&mut h.driver).await;

    let out = h
        .driver
        .handle(Inbound::PrepareForErase {
            remove_bg: true,
            base64img: String::new(),
        })
        .await;
    assert_eq!(
        error_kinds(&out),
        vec![ErrorKind::MissingConfigurationError]
    );
    assert_eq!(h.driver.in_flight(), 0);
    assert_eq!(h.remover.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test(flavor = "current_thread")]
async fn remover_failure_is_reported_and_erasing_continues() {
    let mut h = harness_with(Some(402));
    h.driver
        .handle(Inbound::SettingsChanged {
            settings: Some(settings()),
        })
        .await;
    to_erasing(&mut h.driver).await;
    h.driver
        .handle(Inbound::PrepareForErase {
            remove_bg: true,
            base64img: String::new(),
        })
        .await;

    let out = h.driver.settle().await;
    assert_eq!(error_kinds(&out), vec![ErrorKind::RemoteServiceError]);
    assert_eq!(h.driver.orchestrator().stage(), Stage::Erasing);
}

#[tokio::test(flavor = "current_thread")]
async fn new_source_discards_outstanding_removal() {
    let mut h = harness();
    h.driver
        .handle(Inbound::SettingsChanged {
            settings: Some(settings()),
        })
        .await;
    to_erasing(&mut h.driver).await;
    h.driver
        .handle(Inbound::PrepareForErase {
            remove_bg: true,
            base64img: String::new(),
        })
        .await;
    h.driver
        .handle(Inbound::CropImageInit { img_url: photo() })
        .await;

    let out = h.driver.settle().await;
    assert!(out.is_empty(), "stale removal leaked: {out:?}");
    assert_eq!(h.driver.orchestrator().stage(), Stage::Cropping);
}

#[tokio::test(flavor = "current_thread")]
async fn download_writes_the_sticker() {
    let mut h = harness();
    to_compositing(&mut h.driver).await;

    let out = h.driver.handle(Inbound::DownloadSticker).await;
    assert!(out.contains(&Outbound::StickerDownloaded {
        filename: DOWNLOAD_FILENAME.into()
    }));
    assert_eq!(h.driver.orchestrator().stage(), Stage::Done);

    let png = std::fs::read(h.dir.path().join(DOWNLOAD_FILENAME)).unwrap();
    assert_eq!(asset::decode(&png).unwrap().dimensions(), (512, 512));
}

#[tokio::test(flavor = "current_thread")]
async fn upload_without_credentials_never_calls_the_service() {
    let mut h = harness();
    to_compositing(&mut h.driver).await;

    let out = h.driver.handle(Inbound::RequestUploadToPack).await;
    assert_eq!(
        error_kinds(&out),
        vec![ErrorKind::MissingConfigurationError]
    );
    assert_eq!(h.driver.in_flight(), 0);
    assert_eq!(h.uploader.calls.load(Ordering::SeqCst), 0);
    assert_eq!(h.driver.orchestrator().stage(), Stage::Compositing);
}

#[tokio::test(flavor = "current_thread")]
async fn upload_reaches_the_service_and_finishes() {
    let mut h = harness();
    h.driver
        .handle(Inbound::SettingsChanged {
            settings: Some(settings()),
        })
        .await;
    to_compositing(&mut h.driver).await;

    h.driver.handle(Inbound::RequestUploadToPack).await;
    let out = h.driver.settle().await;

    assert_eq!(h.uploader.calls.load(Ordering::SeqCst), 1);
    assert!(out.contains(&Outbound::StickerUploadedSuccess));
    assert_eq!(h.driver.orchestrator().stage(), Stage::Done);
    let target = h.uploader.last_target.lock().unwrap().clone().unwrap();
    assert_eq!(target.pack_name, "cutcut_by_cut_bot");
    assert_eq!(target.bot_id, "42");
}
