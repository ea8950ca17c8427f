// LLM prompt constants for resume parsing.

use crate::llm_client::ChatOptions;

/// Low temperature: extraction, not generation.
pub const RESUME_PARSE_OPTIONS: ChatOptions = ChatOptions {
    temperature: 0.2,
    max_tokens: 1200,
};

/// Keys the parser must return. `profile::merge` reads the first five.
pub const RESUME_FIELDS: [&str; 8] = [
    "Name",
    "Email",
    "Phone Number",
    "Location",
    "Years of Experience",
    "Skills",
    "Work Experience",
    "Education",
];

/// Resume parsing prompt template. Replace `{resume_text}` before sending.
pub const RESUME_PARSE_PROMPT_TEMPLATE: &str = r#"You are a professional resume parser.

Given the resume text below, extract the following fields as a JSON object:
- "Name": string
- "Email": string
- "Phone Number": string
- "Location": string (city, country)
- "Years of Experience": integer, total years of professional experience
- "Skills": list of strings
- "Work Experience": list of {"Company", "Role", "Duration", "Description"}
- "Education": list of {"Institution", "Degree", "Year"}

Use null for any field the resume does not state.

Resume Text:
"""
{resume_text}
"""

Respond with only valid JSON, no extra text."#;
