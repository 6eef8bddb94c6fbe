//! The instruction text sent alongside every whiteboard photo.

/// Bumped whenever [`DESIGN_PROMPT`] changes meaningfully.
pub const PROMPT_VERSION: &str = "2";

/// Heading that introduces the user's own instruction.
pub const CUSTOM_INSTRUCTIONS_HEADING: &str =
    "ADDITIONAL USER INSTRUCTIONS (these override the design defaults above):";

/// Fixed instructions and house design defaults.
pub const DESIGN_PROMPT: &str = r#"You are looking at a photo of a whiteboard sketch of a user interface.
Build it as a working, interactive prototype.

Output rules:
- Reply with ONE complete, self-contained HTML document and nothing else.
- Start with <!DOCTYPE html>. No markdown, no code fences, no commentary.
- Inline all CSS in a <style> tag and all JavaScript in a <script> tag.
- No external assets, fonts, CDNs or network requests.
- Every button, link and form control must do something sensible.
- Read handwritten labels carefully and keep the sketch's layout and hierarchy.
- Make it responsive; it will mostly be opened on a phone.

Design defaults (always apply unless the user says otherwise):
- Colors: background #F5F5F7, surface #FFFFFF, text #1D1D1F, secondary text #6E6E73,
  primary accent #0071E3, accent hover #0077ED, borders #D2D2D7, danger #FF3B30,
  success #34C759.
- Typography: font-family -apple-system, BlinkMacSystemFont, "SF Pro Text",
  "Segoe UI", Roboto, "Helvetica Neue", Arial, sans-serif; base size 16px,
  line-height 1.5; headings weight 600.
- Corners: border-radius 12px on cards and panels, 8px on buttons and inputs.
- Buttons: min-height 44px, padding 0 20px, primary buttons filled with the
  accent color and white text, secondary buttons white with a 1px border,
  no text-transform.
- Inputs: height 44px, 1px solid #D2D2D7 border, focus ring
  0 0 0 3px rgba(0, 113, 227, 0.25) with the border set to the accent color.
- Spacing: 8px grid; cards use 24px padding and a shadow of
  0 1px 3px rgba(0, 0, 0, 0.08).
- Motion: transitions of 200ms using cubic-bezier(0.4, 0, 0.2, 1); respect
  prefers-reduced-motion."#;

/// The full prompt: [`DESIGN_PROMPT`], then `custom` (if non-blank) under
/// [`CUSTOM_INSTRUCTIONS_HEADING`].
pub fn build_prompt(custom: Option<&str>) -> String {
    let mut prompt = String::from(DESIGN_PROMPT);
    if let Some(custom) = custom.map(str::trim).filter(|c| !c.is_empty()) {
        prompt.push_str("\n\n");
        prompt.push_str(CUSTOM_INSTRUCTIONS_HEADING);
        prompt.push('\n');
        prompt.push_str(custom);
    }
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_instruction_means_defaults_only() {
        assert_eq!(build_prompt(None), DESIGN_PROMPT);
        assert_eq!(build_prompt(Some("   \n")), DESIGN_PROMPT);
    }

    #[test]
    fn custom_instruction_is_appended() {
        let prompt = build_prompt(Some("  Use a dark theme "));
        assert!(prompt.starts_with(DESIGN_PROMPT));
        assert!(prompt.ends_with(&format!("{CUSTOM_INSTRUCTIONS_HEADING}\nUse a dark theme")));
    }
}
