//! Attach an upload to a product that is saved later, then thumbnail it.
//!
//! Run with `cargo run -p storm-files --example attachments`.

use std::sync::Arc;
use storm_cache::{CacheConfig, MemoryBackend};
use storm_files::{init_logging, FileService, FilesConfig, LoggingConfig, ThumbMode, UploadedFile};
use storm_orm::{ModelSchema, RelationDefinition, Row, Storm};
use storm_storage::{LocalBackend, LocalStorageConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    init_logging(LoggingConfig::development())?;

    let root = tempfile::tempdir()?;
    let storm = Storm::memory();
    storm.register(
        ModelSchema::new("Product", "products")
            .relation(RelationDefinition::attach_many("photos", "File"))
            .relation(RelationDefinition::attach_one("manual", "File").public(false)),
    )?;

    let files = FileService::install(
        &storm,
        Arc::new(LocalBackend::new(LocalStorageConfig::default().with_root_path(root.path()))),
        Arc::new(MemoryBackend::new(CacheConfig::default())),
        FilesConfig::from_env(),
    )?;

    // The form session: the product has no key yet
    let session = Storm::new_session_key();
    let product = storm.new_record("Product")?;
    product.set("name", "Desk lamp");

    let mut canvas = image::RgbaImage::new(64, 32);
    for (x, _, pixel) in canvas.enumerate_pixels_mut() {
        *pixel = image::Rgba([(x * 4) as u8, 96, 160, 255]);
    }
    let mut png = Vec::new();
    image::DynamicImage::ImageRgba8(canvas).write_to(
        &mut std::io::Cursor::new(&mut png),
        image::ImageOutputFormat::Png,
    )?;

    let photo = files.from_post(UploadedFile::new("lamp.png", png)).await?;
    storm
        .relation(&product, "photos")?
        .add(photo.record(), Some(&session), Row::new())
        .await?;

    let manual = files.from_data(&b"Unscrew the base to replace the bulb."[..], "manual.txt").await?;
    storm
        .relation(&product, "manual")?
        .add(manual.record(), Some(&session), Row::new())
        .await?;

    println!(
        "before save: {} committed photos",
        storm.relation(&product, "photos")?.count(None).await?
    );
    storm.save(&product, Some(&session)).await?;
    println!(
        "after save: {} committed photos",
        storm.relation(&product, "photos")?.count(None).await?
    );

    println!("photo url:     {}", photo.get_path());
    println!("photo size:    {}", photo.size_to_string());
    println!("thumbnail:     {}", photo.get_thumb(32, 32, None).await);
    let cropped = files.thumb_defaults().mode(ThumbMode::Crop).offset(8, 0);
    println!("cropped thumb: {}", photo.get_thumb(24, 24, Some(cropped)).await);
    let manual_url = storm.relation(&product, "manual")?.get_simple_value(None).await?;
    println!("manual url:    {}", manual_url);

    storm.delete(&product).await?;
    println!("files left: {}", storm.all("File").await?.len());
    Ok(())
}
