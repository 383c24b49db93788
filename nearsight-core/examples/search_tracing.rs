//! Example demonstrating search tracing instrumentation.
//!
//! Builds a small synthetic corpus (an exact copy, a crop, a downscaled copy
//! and an unrelated image), then searches it with debug-level tracing on.
//!
//! Run with: cargo run -p nearsight-core --example search_tracing

use image::imageops::FilterType;
use image::{DynamicImage, Rgb, RgbImage};
use tracing_subscriber::{fmt, EnvFilter};

use nearsight_core::{
    CorpusCache, DescriptorBuilder, MemoryStore, RecordStore, ScanControl, SearchConfig,
    StoredRecord,
};

fn waves(width: u32, height: u32, shift: f64) -> DynamicImage {
    let img = RgbImage::from_fn(width, height, |x, y| {
        let (x, y) = (x as f64 / width as f64, y as f64 / height as f64);
        let r = 128.0 + 90.0 * (9.0 * x + 4.0 * y + shift).sin();
        let g = 128.0 + 70.0 * (5.0 * y - 7.0 * x).cos();
        let b = 128.0 + 50.0 * (13.0 * x * y + shift).sin();
        Rgb([r as u8, g as u8, b as u8])
    });
    DynamicImage::ImageRgb8(img)
}

fn main() {
    fmt()
        .with_env_filter(EnvFilter::new("nearsight_core=debug,info"))
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    println!("=== Nearsight Search Tracing Demo ===\n");

    let config = SearchConfig::from_env();
    let builder = DescriptorBuilder::from_config(&config);
    let original = waves(160, 120, 0.0);

    let candidates = [
        ("copy", original.clone()),
        ("crop", original.crop_imm(24, 18, 112, 84)),
        ("thumbnail", original.resize_exact(80, 60, FilterType::Triangle)),
        ("unrelated", waves(160, 120, 2.5).fliph()),
    ];

    let store = MemoryStore::new();
    for (id, image) in &candidates {
        let descriptor = match builder.build(image) {
            Ok(d) => d,
            Err(e) => {
                eprintln!("Failed to describe {}: {}", id, e);
                return;
            }
        };
        let record = StoredRecord::new(
            *id,
            format!("{id}.png"),
            "demo",
            chrono::Utc::now(),
            descriptor,
        );
        if let Err(e) = store.put(id, &record) {
            eprintln!("Failed to store {}: {}", id, e);
            return;
        }
    }

    let cache = CorpusCache::new();
    match cache.reload(&store, &config) {
        Ok(stats) => println!("\nLoaded {} records\n", stats.loaded),
        Err(e) => {
            eprintln!("Failed to load corpus: {}", e);
            return;
        }
    }

    let query = match builder.build(&original) {
        Ok(q) => q,
        Err(e) => {
            eprintln!("Failed to describe query: {}", e);
            return;
        }
    };

    let mut control = ScanControl::new().on_progress(|p| {
        println!("   progress {}/{}", p.processed_count, p.total_count)
    });

    match cache.search(&query, &config, &mut control) {
        Ok(report) => {
            println!("\n✅ {} of {} records matched", report.results.len(), report.scanned);
            for result in &report.results {
                println!(
                    "   {:<10} {:.3}  {}",
                    result.name, result.final_score, result.match_type
                );
            }
        }
        Err(e) => println!("\n❌ Search failed: {}", e),
    }
}
