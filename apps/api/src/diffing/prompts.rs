// Semantic comparison prompt templates. All prompts for this module live here.

pub const COMPARE_SYSTEM: &str = "\
You are a precise semantic comparator for career facts. Given a newly \
extracted value and a previously confirmed value for the same field, classify \
their relationship. You MUST respond with valid JSON only — no markdown \
fences, no explanations. 'equivalent' means the same fact worded differently; \
'conflicting' means the facts cannot both be true.";

pub const COMPARE_PROMPT: &str = r#"Compare these two values for the same career fact.

EXTRACTED (new, unconfirmed): {extracted}
CONFIRMED (user-approved): {confirmed}

OUTPUT SCHEMA (return exactly this structure):
{
  "diff_type": "identical" | "equivalent" | "conflicting",
  "similarity": 0.0,
  "justification": "one sentence explaining the classification",
  "requires_review": true
}

Set requires_review to true whenever a human should look before the extracted
value replaces the confirmed one.
"#;
