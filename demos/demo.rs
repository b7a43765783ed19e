//! Demo showing a typical driver session against one device

use hmdriver::{By, Driver, SessionConfig};
use std::env;

/// Truncate a string to a maximum number of characters (Unicode-safe)
fn truncate_str(s: &str, max_chars: usize) -> String {
    let char_count = s.chars().count();
    if char_count > max_chars {
        let truncated: String = s.chars().take(max_chars - 3).collect();
        format!("{}...", truncated)
    } else {
        s.to_string()
    }
}

#[tokio::main]
async fn main() -> hmdriver::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let serial = env::args().nth(1).unwrap_or_else(|| "127.0.0.1:5555".to_string());
    println!("=== hmdriver Demo - {} ===\n", serial);

    let config = SessionConfig::new(&serial);
    let driver = Driver::connect(&config, "", "").await?;

    let size = driver.screen_size().await?;
    println!("Screen size: {}x{}", size.width, size.height);
    println!("Foreground bundle: {}", driver.current_bundle().await?);

    driver.home().await?;

    // Everything labelled "设置" that is still enabled
    let mut filters = hmdriver::Params::new();
    filters.insert("enabled".into(), true.into());
    match driver.find_elements(By::Text, "设置", filters, 5).await? {
        Some(elements) => {
            println!("\n{:<40} {}", "EUID", "Text");
            println!("{}", "-".repeat(60));
            for mut element in elements {
                let text = element.text().await?;
                println!("{:<40} {}", truncate_str(element.euid(), 38), text);
            }
        }
        None => println!("No enabled \"设置\" element on screen"),
    }

    if let Some(mut gallery) = driver.find_element(By::Text, "图库", None, 5).await? {
        println!("\nFound 图库 at {:?}", gallery.bounds().await?);
        // Uncomment to open it:
        // gallery.click().await?;
    }

    if let Some(mut window) = driver.find_window_focused().await? {
        println!("Focused window: {}", window.title().await?);
    }

    // Uncomment to save a screenshot:
    // driver.screenshot_file(Some(std::path::Path::new("demo.png"))).await?;

    driver.stop().await;
    Ok(())
}
