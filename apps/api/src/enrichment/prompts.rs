// Enrichment prompt templates. All prompts for this module live here.

pub const ENRICHMENT_SYSTEM: &str = "\
You are a career analyst. Given one extracted resume fact, produce structured \
insight about it. You MUST respond with valid JSON only — no markdown fences, \
no explanations. Ground every insight in the given value; never invent \
employers, dates, or technologies that are not present.";

pub const ENRICHMENT_PROMPT: &str = r#"Analyze the following extracted resume fact.

FIELD: {field_name}
VALUE: {value}

OUTPUT SCHEMA (return exactly this structure):
{
  "insights": ["short observation strings, ordered by importance"],
  "skills": ["identified skill names"],
  "experience_level": "entry" | "mid" | "senior" | "staff" | "executive" | null,
  "career_progression": "one-paragraph narrative, or null if not inferable",
  "market_relevance": "one-paragraph narrative, or null if not inferable",
  "recommendations": ["actionable suggestion strings"],
  "confidence": 0.0
}
"#;
