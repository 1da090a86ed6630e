use crate::ai::{ConceptBrief, RefinementBrief};
use crate::models::Palette;

pub fn logo_prompt(brief: &ConceptBrief) -> String {
    format!(
        "Create a professional logo design: {}. Visual theme and style: {}. \
         Clean vector style, centered on a plain background, no text unless requested, \
         suitable for brand identity.",
        brief.logo_description.trim(),
        brief.theme_description.trim()
    )
}

pub fn refinement_prompt(refinement: &RefinementBrief) -> String {
    let mut prompt = format!(
        "Refine this logo: {}. Original concept: {}. Theme: {}.",
        refinement.refinement_prompt.trim(),
        refinement.brief.logo_description.trim(),
        refinement.brief.theme_description.trim()
    );

    let preserved: Vec<&str> = refinement
        .preserve_aspects
        .iter()
        .map(|a| a.trim())
        .filter(|a| !a.is_empty())
        .collect();
    if !preserved.is_empty() {
        prompt.push_str(&format!(" Keep the following unchanged: {}.", preserved.join(", ")));
    }

    prompt
}

pub fn palette_prompt(brief: &ConceptBrief, count: usize) -> String {
    format!(
        "Suggest {} distinct brand colour palettes for a logo described as \"{}\" \
         with the theme \"{}\". Each palette has a short name, 3 to 6 colours as \
         #RRGGBB hex codes ordered from primary to accent, and a one-sentence description.",
        count,
        brief.logo_description.trim(),
        brief.theme_description.trim()
    )
}

pub fn recolor_prompt(palette: &Palette) -> String {
    format!(
        "Recolour this logo using only the \"{}\" palette: {}. \
         Keep shapes, composition and background layout identical.",
        palette.name,
        palette.colors.join(", ")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn brief() -> ConceptBrief {
        ConceptBrief {
            logo_description: "A minimalist fox logo".to_string(),
            theme_description: "Blue and gray corporate".to_string(),
        }
    }

    #[test]
    fn test_logo_prompt_includes_both_descriptions() {
        let prompt = logo_prompt(&brief());
        assert!(prompt.contains("A minimalist fox logo"));
        assert!(prompt.contains("Blue and gray corporate"));
    }

    #[test]
    fn test_refinement_prompt_lists_preserved_aspects() {
        let refinement = RefinementBrief {
            brief: brief(),
            refinement_prompt: "make the tail bushier".to_string(),
            preserve_aspects: vec!["layout".to_string(), " ".to_string(), "colors".to_string()],
        };
        let prompt = refinement_prompt(&refinement);
        assert!(prompt.contains("make the tail bushier"));
        assert!(prompt.contains("Keep the following unchanged: layout, colors."));

        let no_preserve = RefinementBrief {
            preserve_aspects: Vec::new(),
            ..refinement
        };
        assert!(!refinement_prompt(&no_preserve).contains("unchanged"));
    }

    #[test]
    fn test_recolor_prompt_lists_colors_in_order() {
        let palette = Palette {
            name: "Harbor".to_string(),
            colors: vec!["#0A2540".to_string(), "#8899AA".to_string()],
            description: None,
        };
        assert!(recolor_prompt(&palette).contains("#0A2540, #8899AA"));
    }
}
