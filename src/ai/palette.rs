use serde::Deserialize;

use crate::models::{normalize_hex_color, Palette};
use crate::types::{AppError, AppResult};

#[derive(Debug, Deserialize)]
pub struct RawPalette {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub colors: Vec<String>,
    #[serde(default)]
    pub description: Option<String>,
}

/// Clean up palettes returned by the model: invalid hex codes are dropped,
/// palettes left without colours are skipped, unnamed ones get a positional
/// name. Fails when fewer than `count` usable palettes remain; extras are cut.
pub fn select_palettes(raw: Vec<RawPalette>, count: usize) -> AppResult<Vec<Palette>> {
    let palettes: Vec<Palette> = raw
        .into_iter()
        .filter_map(|p| {
            let colors: Vec<String> = p.colors.iter().filter_map(|c| normalize_hex_color(c)).collect();
            if colors.is_empty() {
                return None;
            }
            Some((p.name, colors, p.description))
        })
        .enumerate()
        .map(|(i, (name, colors, description))| Palette {
            name: name
                .map(|n| n.trim().to_string())
                .filter(|n| !n.is_empty())
                .unwrap_or_else(|| format!("Palette {}", i + 1)),
            colors,
            description,
        })
        .take(count)
        .collect();

    if palettes.len() < count {
        return Err(AppError::Generation(format!(
            "expected {} palettes, got {} usable",
            count,
            palettes.len()
        )));
    }

    Ok(palettes)
}
