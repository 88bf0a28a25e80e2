//! Prompts sent to the model.
//!
//! The system prompt can be replaced through `system_prompt` in the config
//! file; the constant here is used otherwise.

pub const SYSTEM_PROMPT: &str = r#"You are an expert clinical analyst.
Your role is to extract text from posters.
Create a blueprint for the poster.
Extract text from each section title, authors, introduction, methods, results and summary.
Extract data from each figure in CSV format."#;

pub const DEFAULT_POSTER_PDF: &str =
    "data/SP00240-Isolation_of_Tumor_Infiltrating_Leukocytes_from_Mouse_Tumors.pdf";

pub const DEFAULT_OUTPUT_DIR: &str = "data/output";

/// Build the extraction instruction for one poster.
pub fn extraction_instruction(pdf: &str, output_dir: &str) -> String {
    format!(
        "Using Bedrock Data Automation, extract the text from {}. Download the output to {}",
        pdf, output_dir
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_prompt_covers_sections() {
        for section in ["title", "authors", "introduction", "methods", "results", "summary"] {
            assert!(SYSTEM_PROMPT.contains(section), "missing {}", section);
        }
        assert!(SYSTEM_PROMPT.contains("CSV"));
    }

    #[test]
    fn test_default_instruction() {
        let instruction = extraction_instruction(DEFAULT_POSTER_PDF, DEFAULT_OUTPUT_DIR);
        assert!(instruction.starts_with("Using Bedrock Data Automation"));
        assert!(instruction.contains(DEFAULT_POSTER_PDF));
        assert!(instruction.ends_with("data/output"));
    }
}
