use crate::config::IDENTITY_PROMPT;
use crate::stylist::types::OutfitDescriptions;

const ACCESSORY_LEAD: &str = " Additionally, she is accessorized with ";

/// Builds the base prompt: fixed identity followed by the garments.
pub fn compose(top: &str, bottom: &str, shoes: &str, jacket: Option<&str>) -> String {
    let jacket_clause = match jacket.map(str::trim) {
        Some(jacket) if !jacket.is_empty() => format!(" The outfit includes {jacket}."),
        _ => String::new(),
    };
    format!("{IDENTITY_PROMPT} She is wearing {top}, {bottom}, and {shoes}.{jacket_clause}")
}

pub fn compose_outfit(descriptions: &OutfitDescriptions) -> String {
    compose(
        &descriptions.top.text,
        &descriptions.bottom.text,
        &descriptions.shoes.text,
        descriptions.jacket.as_ref().map(|jacket| jacket.text.as_str()),
    )
}

/// Returns a new prompt; the stored base is never modified.
pub fn append_suggestion(base_prompt: &str, appendix: &str) -> String {
    format!("{base_prompt} {appendix}").trim().to_string()
}

pub fn single_suggestion_appendix(suggestion: &str) -> String {
    format!("{ACCESSORY_LEAD}{suggestion}.")
}

pub fn all_suggestions_appendix(suggestions: &[String]) -> String {
    format!("{ACCESSORY_LEAD}{}", suggestions.join(", "))
}
