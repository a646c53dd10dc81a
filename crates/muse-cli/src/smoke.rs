use anyhow::{Context, Result};
use image::{Rgb, RgbImage};
use muse_engine::gemini::ModelInfo;
use muse_engine::imaging::default_loader_registry;
use muse_engine::{ChatSession, Config, GeminiClient, ImageAttachment, ImageGenerator, ImageOutput};
use tracing::{error, info, warn};

const MULTI_TURN_PROMPTS: &[&str] = &[
    "Hi there! What can you do?",
    "Can you tell me about the benefits of exercise?",
    "What kind of exercises are good for beginners?",
    "Thanks!",
];

/// Walks the live services step by step. Output only; a failing step is
/// reported and the next one still runs.
pub fn run_smoke() -> Result<()> {
    let config = Config::load()?;
    let client = GeminiClient::new(&config)?;

    text_round_trip(&config, &client);
    multi_turn_then_reset(&config, &client);
    if let Err(err) = multimodal_understanding(&config, &client) {
        println!("Error during multimodal image understanding test: {err:#}");
    }
    image_generation(&config);
    if let Err(err) = list_models(&config, &client) {
        error!("Error listing models: {err:#}");
    }
    Ok(())
}

fn session(config: &Config, client: &GeminiClient) -> ChatSession<GeminiClient> {
    ChatSession::new(client.clone(), &config.text_model, &config.vision_model)
}

fn text_round_trip(config: &Config, client: &GeminiClient) {
    info!(model = %config.text_model, "testing text-to-text conversation");
    let prompt = "Tell me a fun fact about Mumbai, India.";
    println!("You: {prompt}");
    println!("Chatbot: {}", session(config, client).send_message(prompt, None));
}

fn multi_turn_then_reset(config: &Config, client: &GeminiClient) {
    info!(model = %config.text_model, "testing multi-turn conversation");
    let mut chat = session(config, client);
    for (index, prompt) in MULTI_TURN_PROMPTS.iter().enumerate() {
        println!("You ({}): {prompt}", index + 1);
        println!("Chatbot ({}): {}\n", index + 1, chat.send_message(prompt, None));
    }

    chat.reset();
    println!("\nChatbot session reset. New conversation starting.");
    let follow_up = "What was our last conversation about?";
    println!("You: {follow_up}");
    println!("Chatbot: {}", chat.send_message(follow_up, None));
}

fn multimodal_understanding(config: &Config, client: &GeminiClient) -> Result<()> {
    info!(model = %config.vision_model, "testing multimodal image understanding");
    let temp = tempfile::Builder::new()
        .prefix("muse_smoke_")
        .suffix(".png")
        .tempfile()
        .context("failed to create temporary test image")?;
    RgbImage::from_pixel(60, 30, Rgb([255, 0, 0]))
        .save(temp.path())
        .context("failed to write temporary test image")?;
    info!(path = %temp.path().display(), "created temporary test image");

    let attachment = ImageAttachment::from_path(temp.path())?;
    let query = "What do you see in this image? Describe it briefly.";
    println!("Sending image and query: '{query}'");
    println!("Chatbot: {}", session(config, client).send_message(query, Some(&attachment)));
    temp.close().context("failed to remove temporary test image")?;
    Ok(())
}

fn image_generation(config: &Config) {
    let prompt = "A majestic lion standing on a savannah at sunset, photorealistic";
    info!(backend = %config.image_backend, "testing image generation");
    println!("You: Generate an image of: '{prompt}'");
    let generator = ImageGenerator::from_registry(
        &default_loader_registry(config),
        &config.image_backend,
        &config.output_dir,
    );
    let outputs = generator.generate(prompt);
    if outputs.is_empty() {
        println!("Chatbot: Could not generate image for the given prompt.");
        return;
    }
    println!("Chatbot: Generated image(s) for you!");
    for (index, output) in outputs.iter().enumerate() {
        match output {
            ImageOutput::Path(path) => println!("Image {}: {}", index + 1, path.display()),
            ImageOutput::Error(message) => println!("Image {}: {message}", index + 1),
        }
    }
}

fn list_models(config: &Config, client: &GeminiClient) -> Result<()> {
    info!("listing all available models for this API key");
    let models = client.list_models()?;
    for model in &models {
        info!(
            "  Model Name: {}, Methods: {:?}",
            model.name, model.supported_generation_methods
        );
    }
    let candidates = image_capable_models(&models);
    for name in &candidates {
        info!("    found a potentially usable image model: {name}");
    }
    if !models.iter().any(|model| model.name == config.image_model) {
        warn!(model = %config.image_model, "configured image model is not listed for this API key");
    }
    if candidates.is_empty() {
        warn!("no image-capable models supporting generateContent were found for this API key");
    }
    Ok(())
}

fn image_capable_models(models: &[ModelInfo]) -> Vec<&str> {
    models
        .iter()
        .filter(|model| {
            let name = model.name.to_ascii_lowercase();
            (name.contains("imagen") || name.contains("image-generation"))
                && model.supports("generateContent")
        })
        .map(|model| model.name.as_str())
        .collect()
}
