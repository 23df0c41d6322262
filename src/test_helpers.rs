//! Shared test utilities for the last-call test suite.
//!
//! Provides a small guide fixture, a tiny PNG, and scripted stand-ins for the
//! pipeline's seams (generator and clock) that record how they were used.
//!
//! # Usage
//!
//! ```text
//! use crate::test_helpers::*;
//!
//! let generator = ScriptedGenerator::new(vec![Err(rate_limited()), Ok(tiny_png())]);
//! let clock = RecordingClock::new();
//! // ... run the pipeline ...
//! assert_eq!(generator.call_count(), 2);
//! assert_eq!(clock.sleeps(), vec![Duration::from_secs(70)]);
//! ```

use crate::acquire::Clock;
use crate::generation::{GeneratedImage, GenerationError, ImageGenerator};
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use std::collections::VecDeque;
use std::io::Cursor;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

// =========================================================================
// Fixture setup
// =========================================================================

/// Write a three-chapter guide plus a draft into `dir`.
///
/// Chapters: `000-intro` (no images), `010-rule-1` (bar_scheme.webp),
/// `020-faq` (fake_smile.webp). `notes.md` is an unnumbered draft that
/// references tears.webp and must never show up.
pub fn write_guide_fixture(dir: &Path) {
    std::fs::create_dir_all(dir).unwrap();
    std::fs::write(
        dir.join("guide.toml"),
        "title = \"Test Handbook\"\nsubtitle = \"for testers\"\n",
    )
    .unwrap();
    std::fs::write(
        dir.join("000-intro.md"),
        "# Welcome to Hell\n\nSo you want to be a bartender.\n\n> Welcome to chronic insomnia.\n",
    )
    .unwrap();
    std::fs::write(
        dir.join("010-rule-1.md"),
        "# Rule #1: Surviving Behind the Bar\n\n\
         ![Bar layout](bar_scheme.webp \"Fig. 1: The danger zones\")\n\n\
         The bar is not a stage.\n",
    )
    .unwrap();
    std::fs::write(
        dir.join("020-faq.md"),
        "# FAQ\n\n**Can I drink at work?** Officially, no.\n\n![Smile](fake_smile.webp)\n",
    )
    .unwrap();
    std::fs::write(dir.join("notes.md"), "# Draft\n\n![x](tears.webp)\n").unwrap();
}

/// An 8×8 opaque PNG.
pub fn tiny_png() -> Vec<u8> {
    let img = RgbaImage::from_pixel(8, 8, Rgba([16, 185, 129, 255]));
    let mut out = Vec::new();
    DynamicImage::ImageRgba8(img)
        .write_to(&mut Cursor::new(&mut out), ImageFormat::Png)
        .unwrap();
    out
}

// =========================================================================
// Errors
// =========================================================================

pub fn rate_limited() -> GenerationError {
    GenerationError::Http {
        status: 429,
        code: Some("RESOURCE_EXHAUSTED".to_string()),
        message: "Quota exceeded".to_string(),
    }
}

pub fn transient() -> GenerationError {
    GenerationError::Http {
        status: 500,
        code: Some("INTERNAL".to_string()),
        message: "Internal error".to_string(),
    }
}

// =========================================================================
// Scripted generator
// =========================================================================

/// Generator that replays a fixed script of results.
///
/// When the script runs out it falls back to `fallback`: success with a tiny
/// PNG, or a failure from the given constructor.
pub struct ScriptedGenerator {
    script: Mutex<VecDeque<Result<Vec<u8>, GenerationError>>>,
    fallback: Option<fn() -> GenerationError>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedGenerator {
    /// Replay `script`; afterwards every call fails transiently.
    pub fn new(script: Vec<Result<Vec<u8>, GenerationError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            fallback: Some(transient),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn always_ok() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: None,
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn always_failing(error: fn() -> GenerationError) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: Some(error),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

impl ImageGenerator for ScriptedGenerator {
    fn generate(&self, prompt: &str) -> Result<GeneratedImage, GenerationError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        let next = self.script.lock().unwrap().pop_front();
        let result = match (next, self.fallback) {
            (Some(result), _) => result,
            (None, Some(error)) => Err(error()),
            (None, None) => Ok(tiny_png()),
        };
        result.map(|bytes| GeneratedImage {
            bytes,
            mime_type: "image/png".to_string(),
        })
    }
}

// =========================================================================
// Recording clock
// =========================================================================

/// Clock that never sleeps. Elapsed time is the sum of requested sleeps.
#[derive(Default)]
pub struct RecordingClock {
    sleeps: Mutex<Vec<Duration>>,
}

impl RecordingClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().unwrap().clone()
    }
}

impl Clock for RecordingClock {
    fn elapsed(&self) -> Duration {
        self.sleeps.lock().unwrap().iter().sum()
    }

    fn sleep(&self, duration: Duration) {
        self.sleeps.lock().unwrap().push(duration);
    }
}
