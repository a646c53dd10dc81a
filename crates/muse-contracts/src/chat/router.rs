use std::fmt;
use std::path::{Path, PathBuf};

use regex::Regex;

use crate::session::UploadedImage;

const GENERATE_IMAGE_PATTERN: &str = r"(?i)generate an? image of:?(.*)";
const UPLOADED_IMAGE_MARKER: &str = "uploaded image";
const GENERATED_IMAGE_MARKER: &str = "generated image";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteKind {
    GenerateImage,
    UploadedImage,
    GeneratedImage,
    PlainText,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ImageReference {
    Uploaded(UploadedImage),
    Generated(PathBuf),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Route {
    GenerateImage {
        description: String,
    },
    Chat {
        prompt: String,
        image: Option<ImageReference>,
    },
}

impl Route {
    pub fn kind(&self) -> RouteKind {
        match self {
            Route::GenerateImage { .. } => RouteKind::GenerateImage,
            Route::Chat {
                image: Some(ImageReference::Uploaded(_)),
                ..
            } => RouteKind::UploadedImage,
            Route::Chat {
                image: Some(ImageReference::Generated(_)),
                ..
            } => RouteKind::GeneratedImage,
            Route::Chat { image: None, .. } => RouteKind::PlainText,
        }
    }

    fn plain(text: &str) -> Self {
        Route::Chat {
            prompt: text.to_string(),
            image: None,
        }
    }
}

/// Session state a turn can refer back to.
#[derive(Debug, Clone, Copy, Default)]
pub struct RouteContext<'a> {
    pub uploaded: Option<&'a UploadedImage>,
    pub last_generated: Option<&'a Path>,
}

type Resolver = Box<dyn Fn(&str, &RouteContext<'_>) -> Option<Route> + Send + Sync>;

struct RouteRule {
    kind: RouteKind,
    resolve: Resolver,
}

/// Classifies one user turn. Rules run in order and the first one that
/// resolves wins; the plain-text rule always resolves.
pub struct Router {
    rules: Vec<RouteRule>,
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Router")
            .field("precedence", &self.precedence())
            .finish()
    }
}

impl Router {
    pub fn new() -> anyhow::Result<Self> {
        let generate = Regex::new(GENERATE_IMAGE_PATTERN)?;
        let rules = vec![
            RouteRule {
                kind: RouteKind::GenerateImage,
                resolve: Box::new(move |text, _| {
                    let description = generate.captures(text)?.get(1)?.as_str().trim();
                    Some(Route::GenerateImage {
                        description: description.to_string(),
                    })
                }),
            },
            RouteRule {
                kind: RouteKind::UploadedImage,
                resolve: Box::new(|text, ctx| {
                    if !mentions(text, UPLOADED_IMAGE_MARKER) {
                        return None;
                    }
                    let uploaded = ctx.uploaded?;
                    Some(Route::Chat {
                        prompt: text.to_string(),
                        image: Some(ImageReference::Uploaded(uploaded.clone())),
                    })
                }),
            },
            RouteRule {
                kind: RouteKind::GeneratedImage,
                resolve: Box::new(|text, ctx| {
                    if !mentions(text, GENERATED_IMAGE_MARKER) {
                        return None;
                    }
                    // A deleted artifact degrades to a plain turn.
                    let path = ctx.last_generated.filter(|path| path.is_file())?;
                    Some(Route::Chat {
                        prompt: text.to_string(),
                        image: Some(ImageReference::Generated(path.to_path_buf())),
                    })
                }),
            },
            RouteRule {
                kind: RouteKind::PlainText,
                resolve: Box::new(|text, _| Some(Route::plain(text))),
            },
        ];
        Ok(Self { rules })
    }

    pub fn precedence(&self) -> Vec<RouteKind> {
        self.rules.iter().map(|rule| rule.kind).collect()
    }

    pub fn route(&self, text: &str, ctx: &RouteContext<'_>) -> Route {
        self.rules
            .iter()
            .find_map(|rule| (rule.resolve)(text, ctx))
            .unwrap_or_else(|| Route::plain(text))
    }
}

fn mentions(text: &str, marker: &str) -> bool {
    text.to_lowercase().contains(marker)
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::Path;

    use super::{ImageReference, Route, RouteContext, RouteKind, Router};
    use crate::session::UploadedImage;

    fn router() -> Router {
        Router::new().unwrap()
    }

    #[test]
    fn precedence_is_generation_then_uploaded_then_generated_then_plain() {
        assert_eq!(
            router().precedence(),
            vec![
                RouteKind::GenerateImage,
                RouteKind::UploadedImage,
                RouteKind::GeneratedImage,
                RouteKind::PlainText,
            ]
        );
    }

    #[test]
    fn generation_extracts_trimmed_description() {
        let route = router().route(
            "generate an image of: a red bicycle",
            &RouteContext::default(),
        );
        assert_eq!(
            route,
            Route::GenerateImage {
                description: "a red bicycle".to_string()
            }
        );
    }

    #[test]
    fn generation_marker_variants() {
        let router = router();
        let ctx = RouteContext::default();
        for (input, expected) in [
            ("Generate A Image of   Misty Hills  ", "Misty Hills"),
            ("please generate an image of a cat", "a cat"),
            ("GENERATE AN IMAGE OF:a dog", "a dog"),
            ("generate an image of", ""),
            ("generate an image of: two\nsecond line", "two"),
        ] {
            assert_eq!(
                router.route(input, &ctx),
                Route::GenerateImage {
                    description: expected.to_string()
                },
                "input: {input:?}"
            );
        }
    }

    #[test]
    fn generation_short_circuits_image_references() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let generated = temp.path().join("generated_image_1.png");
        fs::write(&generated, b"png")?;
        let upload = UploadedImage::new(vec![7u8]);
        let ctx = RouteContext {
            uploaded: Some(&upload),
            last_generated: Some(&generated),
        };
        let route = router().route(
            "generate an image of the uploaded image and the generated image",
            &ctx,
        );
        assert_eq!(route.kind(), RouteKind::GenerateImage);
        Ok(())
    }

    #[test]
    fn uploaded_reference_attaches_current_upload() {
        let upload = UploadedImage::new(vec![1u8, 2, 3]);
        let ctx = RouteContext {
            uploaded: Some(&upload),
            last_generated: None,
        };
        let route = router().route("What is in the Uploaded Image?", &ctx);
        assert_eq!(
            route,
            Route::Chat {
                prompt: "What is in the Uploaded Image?".to_string(),
                image: Some(ImageReference::Uploaded(upload.clone())),
            }
        );
    }

    #[test]
    fn uploaded_reference_without_upload_falls_back_to_generated() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let generated = temp.path().join("generated_image_1.png");
        fs::write(&generated, b"png")?;
        let ctx = RouteContext {
            uploaded: None,
            last_generated: Some(&generated),
        };
        let route = router().route("compare the uploaded image with the generated image", &ctx);
        assert_eq!(route.kind(), RouteKind::GeneratedImage);

        let route = router().route("what about the uploaded image?", &ctx);
        assert_eq!(route.kind(), RouteKind::PlainText);
        Ok(())
    }

    #[test]
    fn uploaded_reference_wins_over_generated() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let generated = temp.path().join("generated_image_1.png");
        fs::write(&generated, b"png")?;
        let upload = UploadedImage::new(vec![9u8]);
        let ctx = RouteContext {
            uploaded: Some(&upload),
            last_generated: Some(&generated),
        };
        let route = router().route("compare the uploaded image with the generated image", &ctx);
        assert_eq!(route.kind(), RouteKind::UploadedImage);
        Ok(())
    }

    #[test]
    fn generated_reference_resolves_existing_file() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let generated = temp.path().join("generated_image_1.png");
        fs::write(&generated, b"png")?;
        let ctx = RouteContext {
            uploaded: None,
            last_generated: Some(&generated),
        };
        let route = router().route("Describe the GENERATED image", &ctx);
        assert_eq!(
            route,
            Route::Chat {
                prompt: "Describe the GENERATED image".to_string(),
                image: Some(ImageReference::Generated(generated.clone())),
            }
        );
        Ok(())
    }

    #[test]
    fn generated_reference_without_history_is_plain_text() {
        let route = router().route("describe the generated image", &RouteContext::default());
        assert_eq!(
            route,
            Route::Chat {
                prompt: "describe the generated image".to_string(),
                image: None,
            }
        );
    }

    #[test]
    fn generated_reference_to_missing_file_is_plain_text() {
        let missing = Path::new("/nonexistent/generated_image_20240101_000000.png");
        let ctx = RouteContext {
            uploaded: None,
            last_generated: Some(missing),
        };
        let route = router().route("describe the generated image", &ctx);
        assert_eq!(route.kind(), RouteKind::PlainText);
    }

    #[test]
    fn plain_text_keeps_prompt_verbatim() {
        let route = router().route("  Hello there ", &RouteContext::default());
        assert_eq!(
            route,
            Route::Chat {
                prompt: "  Hello there ".to_string(),
                image: None,
            }
        );
    }
}
