//! Full HTTP round trip against a bound listener.

use std::io::Cursor;

use image::{DynamicImage, GenericImageView, ImageFormat, Rgba, RgbaImage};
use reqwest::multipart::{Form, Part};
use serde_json::Value;
use tempfile::tempdir;
use tilesmart::{config::Config, router, seed::seed_if_empty, state::AppState, store::Store};
use tokio::net::TcpListener;

#[tokio::test]
async fn upload_over_http_and_fetch_public_url() {
    let dir = tempdir().expect("tempdir");
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let address = listener.local_addr().expect("address");

    let upload_dir = dir.path().display().to_string();
    let public_url = format!("http://{address}/");
    let config = Config::from_lookup(|key| match key {
        "TILESMART_UPLOAD_DIR" => Some(upload_dir.clone()),
        "TILESMART_PUBLIC_URL" => Some(public_url.clone()),
        "TILESMART_IMAGE_WIDTH" => Some("80".into()),
        "TILESMART_IMAGE_HEIGHT" => Some("60".into()),
        _ => None,
    })
    .expect("config");
    let state = AppState::new(config, Store::open_in_memory().expect("store"));
    assert!(seed_if_empty(&state).expect("seed"));

    let app = router(state);
    tokio::spawn(async move { axum::serve(listener, app).await });

    let client = reqwest::Client::new();
    let base = format!("http://{address}");

    let tiles: Value = client
        .get(format!("{base}/api/tiles?shop=varsha"))
        .send()
        .await
        .expect("list")
        .json()
        .await
        .expect("json");
    let tiles = tiles.as_array().expect("array");
    assert_eq!(tiles.len(), 2);
    let shop_id = tiles[0]["shop"]["id"].as_i64().expect("shop id");

    // Seeded placeholders are real files.
    let seeded_url = tiles[0]["imageUrl"].as_str().expect("imageUrl");
    let seeded = client.get(seeded_url).send().await.expect("seeded image");
    assert!(seeded.status().is_success());

    let mut source = Vec::new();
    DynamicImage::ImageRgba8(RgbaImage::from_pixel(300, 100, Rgba([0, 0, 0, 0])))
        .write_to(&mut Cursor::new(&mut source), ImageFormat::Png)
        .expect("encode fixture");

    let form = Form::new()
        .text("name", "Terracotta Hex")
        .text("price", "275")
        .text("category", "Floor Tiles")
        .text("shopId", shop_id.to_string())
        .part(
            "image",
            Part::bytes(source)
                .file_name("hex.gif")
                .mime_str("image/png")
                .expect("mime"),
        );

    let response = client
        .post(format!("{base}/api/tiles"))
        .multipart(form)
        .send()
        .await
        .expect("upload");
    assert!(response.status().is_success());
    let tile: Value = response.json().await.expect("json");

    let image_url = tile["imageUrl"].as_str().expect("imageUrl");
    assert!(image_url.starts_with(&format!("{base}/uploads/tiles/")));
    assert!(image_url.ends_with("_hex.gif"));

    let bytes = client
        .get(image_url)
        .send()
        .await
        .expect("fetch image")
        .bytes()
        .await
        .expect("bytes");
    assert_eq!(image::guess_format(&bytes).expect("format"), ImageFormat::Gif);
    assert_eq!(
        image::load_from_memory(&bytes).expect("decode").dimensions(),
        (180, 60)
    );
}
