//! End-to-end cache behaviour over the filesystem store and the real image
//! transforms.

use std::{io::Cursor, sync::Arc};

use image::{DynamicImage, ImageFormat, RgbImage};

use attache_store::{
    DefaultTransformMachine, FsRepresentationCache, FsResourceStore, PdftoppmRasterizer,
    RepresentationCache, Representation, ResourceStore, TransformDefinition,
};

fn png(width: u32, height: u32) -> Vec<u8> {
    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x % 256) as u8, (y % 256) as u8, 128])
    }))
    .write_to(&mut out, ImageFormat::Png)
    .unwrap();
    out.into_inner()
}

struct Fixture {
    store: Arc<FsResourceStore>,
    cache: Arc<FsRepresentationCache>,
    _dir: tempfile::TempDir,
}

fn fixture() -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FsResourceStore::new(dir.path().join("resources")));
    let machine = Arc::new(DefaultTransformMachine::new(Arc::new(PdftoppmRasterizer::default())));
    let cache = FsRepresentationCache::new(dir.path().join("cache"), store.clone(), machine)
        .with_url_base("/flavours");
    Fixture {
        store,
        cache: Arc::new(cache),
        _dir: dir,
    }
}

#[tokio::test]
async fn thumbnail_is_generated_once_and_served_identically() {
    let fx = fixture();
    let resource = fx.store.store(png(300, 200), "image/png", "wide.png").await.unwrap();
    let def = TransformDefinition::thumbnail();

    fx.cache.ensure(&resource, &def).await;
    let first = fx.cache.get(&resource, &def).await.unwrap();
    let Representation::Single(ref artifact) = first else {
        panic!("thumbnail should be a single artifact");
    };
    let bytes = artifact.read_all().await.unwrap();
    assert_eq!(image::load_from_memory(&bytes).unwrap().width(), 150);
    assert_eq!(image::load_from_memory(&bytes).unwrap().height(), 150);

    fx.cache.ensure(&resource, &def).await;
    let again = fx.cache.get(&resource, &def).await.unwrap().read_all().await.unwrap();
    assert_eq!(again, vec![bytes]);

    assert_eq!(
        fx.cache.url(&resource, &def).await.unwrap(),
        format!("/flavours/{}/{resource}", def.id())
    );
}

#[tokio::test]
async fn ai_image_bounds_longest_edge() {
    let fx = fixture();
    let resource = fx.store.store(png(2048, 512), "image/png", "strip.png").await.unwrap();
    let def = TransformDefinition::ai_image();

    fx.cache.ensure(&resource, &def).await;
    let bytes = fx.cache.get(&resource, &def).await.unwrap().read_all().await.unwrap();
    let img = image::load_from_memory(&bytes[0]).unwrap();
    assert_eq!((img.width(), img.height()), (1024, 256));
}

#[tokio::test]
async fn concurrent_ensures_converge_on_one_entry() {
    let fx = fixture();
    let resource = fx.store.store(png(64, 64), "image/png", "sq.png").await.unwrap();
    let def = TransformDefinition::thumbnail();

    let handles: Vec<_> = (0..6)
        .map(|_| {
            let cache = Arc::clone(&fx.cache);
            let (resource, def) = (resource.clone(), def.clone());
            tokio::spawn(async move { cache.ensure(&resource, &def).await })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap();
    }

    let rep = fx.cache.get(&resource, &def).await.unwrap();
    assert_eq!(rep.len(), 1);
    assert!(!rep.read_all().await.unwrap()[0].is_empty());
}

#[tokio::test]
async fn undecodable_source_leaves_no_entry() {
    let fx = fixture();
    let resource = fx
        .store
        .store(b"not really a png".to_vec(), "image/png", "broken.png")
        .await
        .unwrap();
    let def = TransformDefinition::thumbnail();

    fx.cache.ensure(&resource, &def).await;
    assert!(fx.cache.get(&resource, &def).await.is_none());
    assert!(fx.cache.url(&resource, &def).await.is_none());
}
