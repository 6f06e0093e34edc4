// Prompts for ATS analysis.

use crate::llm_client::prompts::JSON_ONLY_SYSTEM;

const CV_CHAR_LIMIT: usize = 5000;
const JOB_CHAR_LIMIT: usize = 3000;

pub fn analysis_system() -> String {
    format!(
        "You are an expert ATS (Applicant Tracking System) analyst and career coach. \
         Analyse the CV against the job description rigorously and constructively. \
         All scores are integers between 0 and 100. {JSON_ONLY_SYSTEM}"
    )
}

/// Builds the analysis prompt. `cv_json` is the pretty-printed CV content;
/// both inputs are cut to a fixed number of characters.
pub fn analysis_prompt(cv_json: &str, job_description: &str) -> String {
    let cv: String = cv_json.chars().take(CV_CHAR_LIMIT).collect();
    let job: String = job_description.chars().take(JOB_CHAR_LIMIT).collect();

    format!(
        r#"Analyze the CV against the job description.
Return a JSON object with EXACTLY these keys (no extras):
{{
  "overall_score": <integer 0-100>,
  "keyword_match_pct": <integer 0-100>,
  "breakdown": [
    {{"label": "Keyword Match", "score": <int>, "icon": "key"}},
    {{"label": "Skills Alignment", "score": <int>, "icon": "layers"}},
    {{"label": "Experience Level", "score": <int>, "icon": "ruler"}},
    {{"label": "Formatting", "score": <int>, "icon": "file-check"}}
  ],
  "missing_keywords": [<up to 12 short keyword strings missing from the CV>],
  "present_keywords": [<up to 12 short keyword strings present in the CV>],
  "suggestions": [<5 to 8 specific, actionable improvement tips>],
  "diff_changes": [
    {{"section": "<section name>", "before": "<exact phrase copied from the CV>", "after": "<improved phrase>"}}
  ],
  "comparison": [
    {{"requirement": "<job requirement>", "cv_value": "<matching CV content or 'Not mentioned'>", "status": "<match|missing|partial>"}}
  ]
}}

Every "before" value must be copied verbatim from the CV so it can be found in the document.

CV:
{cv}

Job Description:
{job}"#
    )
}
