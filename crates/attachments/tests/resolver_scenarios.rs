//! Resolver behaviour against an in-memory store, the filesystem cache, and a
//! scripted transform machine.

use std::{
    io::Cursor,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::{Duration, Instant},
};

use {
    async_trait::async_trait,
    image::{DynamicImage, ImageFormat, RgbImage},
};

use {
    attache_attachments::{
        AiPayload, AttachmentInput, AttachmentRecord, ContentResolver, FileType, ImageStage,
        MAX_AI_PAGES, UrlPolicy, pdf::text_fallback,
    },
    attache_config::UrlConfig,
    attache_media::{BoundedImageOptimizer, data_url, image_ops},
    attache_store::{
        Artifact, FsRepresentationCache, MemoryResourceStore, Representation, RepresentationCache,
        ResourceRef, ResourceStore, TransformDefinition, TransformKind, TransformMachine,
        TransformOutput,
    },
};

fn png(width: u32, height: u32) -> Vec<u8> {
    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, image::Rgb([200, 40, 40])))
        .write_to(&mut out, ImageFormat::Png)
        .unwrap();
    out.into_inner()
}

/// Page `n` of a scripted PDF is an `n x 8` PNG, so order survives encoding.
struct ScriptedMachine {
    pages: usize,
    fail_images: bool,
    runs: AtomicUsize,
}

impl ScriptedMachine {
    fn pages(pages: usize) -> Self {
        Self {
            pages,
            fail_images: false,
            runs: AtomicUsize::new(0),
        }
    }

    fn failing_images() -> Self {
        Self {
            pages: 0,
            fail_images: true,
            runs: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl TransformMachine for ScriptedMachine {
    async fn run(
        &self,
        source: Vec<u8>,
        mime_type: &str,
        kind: &TransformKind,
    ) -> attache_store::Result<TransformOutput> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        match *kind {
            TransformKind::ExtractPages { .. } => Ok(TransformOutput::Pages(
                (1..=self.pages as u32).map(|n| png(n, 8)).collect(),
            )),
            TransformKind::CropToSquare {
                max_size_px,
                quality_pct,
            }
            | TransformKind::FitToSquare {
                max_size_px,
                quality_pct,
            } => {
                if self.fail_images {
                    return Err(attache_store::Error::message("transform service down"));
                }
                let out = image_ops::fit_to_square(&source, mime_type, max_size_px, quality_pct)?;
                Ok(TransformOutput::Single(out.data))
            },
        }
    }
}

struct Harness {
    resolver: ContentResolver,
    store: Arc<MemoryResourceStore>,
    _dir: tempfile::TempDir,
}

fn harness(machine: ScriptedMachine, store: MemoryResourceStore, urls: UrlConfig, flavour_base: &str) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(store);
    let cache = FsRepresentationCache::new(dir.path().to_path_buf(), store.clone(), Arc::new(machine))
        .with_url_base(flavour_base);
    let resolver = ContentResolver::new(
        store.clone(),
        Arc::new(cache),
        Arc::new(BoundedImageOptimizer::default()),
        UrlPolicy::from_config(&urls),
    );
    Harness {
        resolver,
        store,
        _dir: dir,
    }
}

fn simple(machine: ScriptedMachine) -> Harness {
    harness(machine, MemoryResourceStore::new(), UrlConfig::default(), "/flavours")
}

async fn pdf(h: &Harness, title: &str) -> AttachmentInput {
    let r = h
        .store
        .store(b"%PDF-1.7 scripted".to_vec(), "application/pdf", title)
        .await
        .unwrap();
    AttachmentInput::new("att", r.as_str(), "application/pdf", title)
}

fn width_of(url: &str) -> u32 {
    let (mime, bytes) = data_url::decode(url).unwrap();
    assert!(mime.starts_with("image/"));
    image_ops::image_dimensions(&bytes).unwrap().0
}

#[tokio::test]
async fn unresolved_reference_yields_nothing() {
    let h = simple(ScriptedMachine::pages(3));
    let input = AttachmentInput::new("att", "does-not-exist", "image/png", "x.png");

    assert_eq!(h.resolver.resolve_for_ai(&input).await, None);
    let urls = h.resolver.resolve_for_display(&input).await;
    assert_eq!(urls.download_url, None);
    assert_eq!(urls.preview_url, None);
    assert_eq!(urls.src, None);
    assert_eq!(urls.data_url, None);

    let malformed = AttachmentInput::new("att", "../etc/passwd", "application/pdf", "x.pdf");
    assert_eq!(h.resolver.resolve_for_ai(&malformed).await, None);
}

#[tokio::test]
async fn three_page_pdf_yields_three_ordered_pages() {
    let h = simple(ScriptedMachine::pages(3));
    let input = pdf(&h, "three.pdf").await;

    let Some(AiPayload::Pages(pages)) = h.resolver.resolve_for_ai(&input).await else {
        panic!("expected page payload");
    };
    assert_eq!(pages.len(), 3);
    for (n, page) in pages.iter().enumerate() {
        assert!(page.starts_with("data:image/"));
        assert_eq!(width_of(page), n as u32 + 1);
    }
}

#[tokio::test]
async fn long_pdf_is_capped_in_page_order() {
    let h = simple(ScriptedMachine::pages(27));
    let input = pdf(&h, "long.pdf").await;

    let parts = h.resolver.resolve_for_ai(&input).await.unwrap().into_parts();
    assert_eq!(parts.len(), MAX_AI_PAGES);
    let widths: Vec<u32> = parts.iter().map(|p| width_of(p)).collect();
    assert_eq!(widths, (1..=20).collect::<Vec<u32>>());
}

#[tokio::test]
async fn pdf_without_pages_gets_text_placeholder() {
    let h = simple(ScriptedMachine::pages(0));
    let input = pdf(&h, "empty.pdf").await;

    let parts = h.resolver.resolve_for_ai(&input).await.unwrap().into_parts();
    assert_eq!(parts, vec![text_fallback("empty.pdf")]);
    assert!(parts[0].starts_with("data:text/plain;base64,"));
    let (_, text) = data_url::decode(&parts[0]).unwrap();
    assert_eq!(text, b"PDF Document: empty.pdf");
}

#[tokio::test]
async fn pdf_display_has_no_preview_or_src() {
    let h = simple(ScriptedMachine::pages(2));
    let input = pdf(&h, "doc.pdf").await;
    let urls = h.resolver.resolve_for_display(&input).await;
    assert_eq!(urls.preview_url, None);
    assert_eq!(urls.src, None);
    assert_eq!(urls.data_url, None);
    assert!(urls.download_url.unwrap().contains("?ref="));
}

#[tokio::test]
async fn image_uses_cached_representation_when_available() {
    let h = simple(ScriptedMachine::pages(0));
    let r = h.store.store(png(2000, 1000), "image/png", "big.png").await.unwrap();
    let input = AttachmentInput::new("att", r.as_str(), "image/png", "big.png");

    let urls = h.resolver.resolve_for_display(&input).await;
    let preview = urls.preview_url.clone().unwrap();
    assert!(preview.starts_with("/flavours/"));
    assert!(preview.ends_with(r.as_str()));
    assert_eq!(urls.src, urls.preview_url);

    let data = urls.data_url.unwrap();
    assert!(data.starts_with("data:image/jpeg;base64,"));
    let (_, bytes) = data_url::decode(&data).unwrap();
    assert_eq!(image_ops::image_dimensions(&bytes).unwrap(), (1024, 512));
}

#[tokio::test]
async fn image_survives_a_failing_representation_path() {
    let h = simple(ScriptedMachine::failing_images());
    let r = h.store.store(png(40, 30), "image/png", "small.png").await.unwrap();
    let input = AttachmentInput::new("att", r.as_str(), "image/png", "small.png");

    let urls = h.resolver.resolve_for_display(&input).await;
    assert_eq!(urls.preview_url, None);
    let data = urls.data_url.clone().unwrap();
    assert!(data.starts_with("data:image/jpeg;base64,"));
    assert_eq!(urls.src, urls.data_url);

    let AiPayload::Single(ai) = h.resolver.resolve_for_ai(&input).await.unwrap() else {
        panic!("images resolve to a single data url");
    };
    assert_eq!(ai, data);
}

/// A cache whose `ensure` hangs, as a wedged transform service would.
struct StalledCache;

#[async_trait]
impl RepresentationCache for StalledCache {
    async fn ensure(&self, _resource: &ResourceRef, _definition: &TransformDefinition) {
        tokio::time::sleep(Duration::from_secs(30)).await;
    }

    async fn get(&self, _resource: &ResourceRef, _definition: &TransformDefinition) -> Option<Representation> {
        Some(Representation::Single(Artifact::Memory(bytes::Bytes::from_static(
            b"\xFF\xD8\xFFnot-an-image",
        ))))
    }

    async fn url(&self, _resource: &ResourceRef, _definition: &TransformDefinition) -> Option<String> {
        None
    }
}

#[tokio::test]
async fn stalled_representation_stage_times_out_into_optimizer() {
    let store = Arc::new(MemoryResourceStore::new());
    let resolver = ContentResolver::new(
        store.clone(),
        Arc::new(StalledCache),
        Arc::new(BoundedImageOptimizer::default()),
        UrlPolicy::default(),
    )
    .with_stage_timeout(Duration::from_millis(50));
    let r = store.store(png(40, 30), "image/png", "slow.png").await.unwrap();
    let input = AttachmentInput::new("att", r.as_str(), "image/png", "slow.png");

    let started = Instant::now();
    let AiPayload::Single(url) = resolver.resolve_for_ai(&input).await.unwrap() else {
        panic!("images resolve to a single data url");
    };
    assert!(started.elapsed() < Duration::from_secs(5));

    // The cached bytes are not an image; a decodable 40x30 JPEG can only come
    // from the optimizer stage.
    assert!(url.starts_with("data:image/jpeg;base64,"));
    let (_, bytes) = data_url::decode(&url).unwrap();
    assert_eq!(image_ops::image_dimensions(&bytes).unwrap(), (40, 30));
}

#[tokio::test]
async fn raw_bytes_are_the_last_resort() {
    let h = simple(ScriptedMachine::failing_images());
    let h = Harness {
        resolver: h
            .resolver
            .with_image_stages([ImageStage::CachedRepresentation, ImageStage::RawBytes]),
        ..h
    };
    let original = png(12, 12);
    let r = h.store.store(original.clone(), "image/png", "tiny.png").await.unwrap();
    let input = AttachmentInput::new("att", r.as_str(), "image/png", "tiny.png");

    let payload = h.resolver.resolve_for_ai(&input).await.unwrap();
    assert_eq!(payload, AiPayload::Single(data_url::encode("image/png", &original)));
}

#[tokio::test]
async fn plugin_context_urls_are_repaired() {
    let urls = UrlConfig {
        external_base_path: "https://chat.example".into(),
        ..Default::default()
    };
    let h = harness(
        ScriptedMachine::pages(0),
        MemoryResourceStore::new().with_url_base("https://lms.example/plugins/attachments/src/storage"),
        urls,
        "https://lms.example/plugins/attachments/src/flavours",
    );
    let r = h.store.store(png(300, 300), "image/png", "sq.png").await.unwrap();
    let input = AttachmentInput::new("att", r.as_str(), "image/png", "sq.png");

    let display = h.resolver.resolve_for_display(&input).await;
    assert_eq!(
        display.download_url.unwrap(),
        format!("https://chat.example/storage/{r}")
    );
    assert_eq!(
        display.preview_url.unwrap(),
        format!("https://chat.example/delivery/{r}")
    );
}

#[tokio::test]
async fn text_and_other_files_are_not_model_input() {
    let h = simple(ScriptedMachine::pages(0));
    for (mime, file_type) in [("text/markdown", FileType::Text), ("application/zip", FileType::Other)] {
        let r = h.store.store(b"payload".to_vec(), mime, "f").await.unwrap();
        let input = AttachmentInput::new("att", r.as_str(), mime, "f");
        assert_eq!(h.resolver.resolve_for_ai(&input).await, None);
        let view = h.resolver.view(&input).await;
        assert_eq!(view.file_type, file_type);
        assert!(!view.is_image);
        assert_eq!(view.src, view.download_url);
    }
}

#[tokio::test]
async fn many_attachments_resolve_in_input_order() {
    let h = simple(ScriptedMachine::pages(2));
    let image_ref = h.store.store(png(10, 10), "image/png", "a.png").await.unwrap();
    let doc = pdf(&h, "b.pdf").await;
    let inputs = vec![
        AttachmentInput::new("1", image_ref.as_str(), "image/png", "a.png"),
        AttachmentInput::new("2", "missing-ref", "image/png", "gone.png"),
        doc,
    ];

    let results = h.resolver.resolve_many_for_ai(&inputs).await;
    assert_eq!(results.len(), 3);
    assert!(matches!(results[0], Some(AiPayload::Single(_))));
    assert_eq!(results[1], None);
    assert!(matches!(results[2], Some(AiPayload::Pages(ref p)) if p.len() == 2));
}

#[tokio::test]
async fn record_view_uses_row_metadata() {
    let h = simple(ScriptedMachine::pages(0));
    let r = h.store.store(png(200, 100), "image/png", "stored.png").await.unwrap();
    let record = AttachmentRecord {
        id: "row-1".into(),
        message_id: "msg-1".into(),
        resource_ref: Some(r.to_string()),
        filename: "IMG_0001.png".into(),
        mime_type: "image/png".into(),
        size: 4242,
        title: "Holiday".into(),
        created_at: 1_700_000_000,
    };

    let view = h.resolver.view(&record).await;
    assert_eq!(view.id, "row-1");
    assert_eq!(view.filename, "IMG_0001.png");
    assert_eq!(view.size, 4242);
    assert!(view.is_image);
    assert_eq!(view.thumbnail_url, view.preview_url);
    assert!(view.preview_url.is_some());
    assert!(view.data_url.is_some());
}

#[tokio::test]
async fn repeated_resolution_reuses_cached_pages() {
    let machine = Arc::new(ScriptedMachine::pages(4));
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryResourceStore::new());
    let cache = FsRepresentationCache::new(dir.path().to_path_buf(), store.clone(), machine.clone());
    let resolver = ContentResolver::new(
        store.clone(),
        Arc::new(cache),
        Arc::new(BoundedImageOptimizer::default()),
        UrlPolicy::default(),
    );
    let r: ResourceRef = store.store(b"%PDF-1.7".to_vec(), "application/pdf", "d.pdf").await.unwrap();
    let input = AttachmentInput::new("att", r.as_str(), "application/pdf", "d.pdf");

    let first = resolver.resolve_for_ai(&input).await;
    let second = resolver.resolve_for_ai(&input).await;
    assert_eq!(first, second);
    assert_eq!(machine.runs.load(Ordering::SeqCst), 1);
}
