//! Shared constants for the generator
//!

use std::sync::LazyLock;

/// Default text-to-image endpoint (SDXL base 1.0 on the Hugging Face router)
pub const DEFAULT_API_URL: &str =
    "https://router.huggingface.co/hf-inference/models/stabilityai/stable-diffusion-xl-base-1.0";

/// URL prefix that generated and reference images are served under
pub const STATIC_URL_PREFIX: &str = "static";

/// Subdirectory of the static dir holding the reference image catalog
pub const GALLERY_SUBDIR: &str = "images";

/// Prefix for generated image filenames
pub const GENERATED_PREFIX: &str = "gen_";

/// Things the model is told to stay away from, mostly carpets and curves.
pub const NEGATIVE_PROMPT: &str = "rug, carpet, central medallion, realistic flower, round shape, blurry, low quality, 3d render, messy lines, curves, organic shapes, watermark, text, realistic photo";

/// Output width, narrow to force a runner shape
pub const IMAGE_WIDTH: u32 = 768;
/// Output height
pub const IMAGE_HEIGHT: u32 = 1024;
/// Diffusion steps per image
pub const INFERENCE_STEPS: u32 = 25;
/// Classifier-free guidance scale
pub const GUIDANCE_SCALE: f32 = 7.5;

/// How much of the prompt ends up in the logs
pub const PROMPT_LOG_CHARS: usize = 60;

/// Max age (in seconds) for image cache entries.
pub const IMAGE_CACHE_MAX_AGE_SECONDS: u64 = 60 * 60;

/// Shared cache max age (in seconds) for image cache entries.
pub const IMAGE_CACHE_S_MAXAGE_SECONDS: u64 = 60 * 60 * 24;

/// Cache-Control value for image responses.
pub static IMAGE_CACHE_CONTROL: LazyLock<String> = LazyLock::new(|| {
    format!(
        "public, max-age={}, s-maxage={}",
        IMAGE_CACHE_MAX_AGE_SECONDS, IMAGE_CACHE_S_MAXAGE_SECONDS
    )
});
