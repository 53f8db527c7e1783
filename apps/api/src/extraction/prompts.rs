// Extraction prompt templates. All prompts for this module live here.

pub const EXTRACTION_SYSTEM: &str = "\
You are a precise resume field extractor. \
Given the text of an uploaded resume, extract every career fact as a flat \
list of typed fields. You MUST respond with valid JSON only — no markdown \
fences, no explanations. Report a confidence between 0 and 1 for each field \
honestly; never inflate confidence for values you inferred rather than read.";

pub const EXTRACTION_PROMPT: &str = r#"Extract structured career facts from the following resume text.

RESUME TEXT:
{document_text}

OUTPUT SCHEMA (return exactly this structure — a JSON array):
[
  {
    "field_name": "dotted path, e.g. work_experience.0.title, education.1.institution, skills.3",
    "value": "string, or a nested JSON object/array when the fact is inherently structured",
    "confidence": 0.0
  }
]

RULES:
- Field names group facts about one logical item under a shared numeric prefix
  (all facts of the first job under work_experience.0.*).
- Do not invent facts that are not in the text.
- Emit dates exactly as written; do not normalize.
"#;
