use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use muse_engine::config::hugging_face_from_env;
use muse_engine::imaging::{post_inference, HostedLoader, HostedResponse};
use reqwest::blocking::Client as HttpClient;
use serde_json::json;

/// Single hosted inference call. Exit code 0 when an image was saved.
pub fn run_hosted(prompt: &str, model: &str, out: &Path) -> Result<i32> {
    let (token, api_base) = hugging_face_from_env();
    let token = token.unwrap_or_default();
    let endpoint = HostedLoader::new(None, api_base).endpoint_for_model(model);
    let http = hosted_http_client()?;

    match post_inference(&http, &endpoint, &token, &json!({ "inputs": prompt }))? {
        HostedResponse::Image(bytes) => {
            save_image(&bytes, out)?;
            println!("Image saved as {}", out.display());
            Ok(0)
        }
        HostedResponse::Failed { status, body } => {
            println!("Error: {status}");
            println!("{body}");
            Ok(1)
        }
    }
}

/// No request timeout: a cold model start blocks the call.
fn hosted_http_client() -> Result<HttpClient> {
    HttpClient::builder()
        .timeout(None::<Duration>)
        .build()
        .context("failed to build Hugging Face HTTP client")
}

fn save_image(bytes: &[u8], out: &Path) -> Result<()> {
    let image = image::load_from_memory(bytes).context("response is not a decodable image")?;
    if let Some(parent) = out.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
    }
    image
        .save(out)
        .with_context(|| format!("failed to save {}", out.display()))
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::thread;
    use std::time::{Duration, Instant};

    use image::{DynamicImage, GenericImageView, Rgb, RgbImage};
    use muse_engine::imaging::{post_inference, HostedResponse};
    use muse_engine::media::encode_png;
    use serde_json::json;

    use super::{hosted_http_client, save_image};

    #[test]
    fn save_image_decodes_and_writes_nested_path() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let out = temp.path().join("nested").join("lion_sunset.png");
        let png = encode_png(&DynamicImage::ImageRgb8(RgbImage::from_pixel(
            8,
            4,
            Rgb([200, 120, 40]),
        )))?;
        save_image(&png, &out)?;
        assert_eq!(image::open(&out)?.dimensions(), (8, 4));
        Ok(())
    }

    #[test]
    fn hosted_call_waits_past_default_client_timeout() -> anyhow::Result<()> {
        let listener = TcpListener::bind("127.0.0.1:0")?;
        let base = format!("http://{}", listener.local_addr()?);
        let server = thread::spawn(move || -> anyhow::Result<()> {
            let (mut stream, _) = listener.accept()?;
            let mut buf = [0u8; 4096];
            let _ = stream.read(&mut buf)?;
            thread::sleep(Duration::from_secs(32));
            stream.write_all(
                b"HTTP/1.1 503 Service Unavailable\r\nContent-Length: 7\r\nConnection: close\r\n\r\nloading",
            )?;
            Ok(())
        });

        let http = hosted_http_client()?;
        let started = Instant::now();
        let response = post_inference(&http, &format!("{base}/model"), "hf_x", &json!({"inputs": "x"}))?;
        assert!(started.elapsed() >= Duration::from_secs(30));
        assert_eq!(
            response,
            HostedResponse::Failed {
                status: 503,
                body: "loading".to_string()
            }
        );
        server.join().map_err(|_| anyhow::anyhow!("server thread panicked"))??;
        Ok(())
    }

    #[test]
    fn save_image_rejects_non_image_bytes() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let out = temp.path().join("x.png");
        assert!(save_image(b"{\"error\":\"loading\"}", &out).is_err());
        assert!(!out.exists());
        Ok(())
    }
}
