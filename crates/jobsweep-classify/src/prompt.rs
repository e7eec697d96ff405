//! Prompt construction: closed output schema plus the structured context a
//! source supplied alongside the free text.

use std::fmt::Write;

/// Per-source structured context passed into the classifier. Only relevant
/// keys are populated for each source.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StructuredInput {
    pub title: Option<String>,
    pub company: Option<String>,
    pub location: Option<String>,
    pub category: Option<String>,
    pub salary_min: Option<f64>,
    pub salary_max: Option<f64>,
    pub salary_predicted: Option<bool>,
    pub experience_level_hint: Option<String>,
    pub workplace_type_hint: Option<String>,
    pub is_remote: Option<bool>,
}

impl StructuredInput {
    /// A structured title/company/category lowers the description length
    /// gate, since the context carries classification weight of its own.
    pub fn has_context(&self) -> bool {
        self.title.is_some() || self.company.is_some() || self.category.is_some()
    }
}

const OUTPUT_SCHEMA: &str = r#"{
  "employer": {
    "department": "string or null",
    "company_size_estimate": "string or null"
  },
  "role": {
    "job_family": "data | product | delivery | out_of_scope",
    "job_subfamily": "string (e.g. data_engineer, ml_engineer, core_pm, technical_pm, growth_pm, ai_ml_pm, out_of_scope)",
    "seniority": "intern | junior | mid | senior | staff_principal | director_plus or null",
    "track": "ic | management or null",
    "position_type": "full_time | part_time | contract or null",
    "experience_range": "string like '5-8 years' or null"
  },
  "location": {
    "working_arrangement": "onsite | hybrid | remote | flexible | unknown"
  },
  "compensation": {
    "currency": "ISO currency code or null",
    "salary_min": "number or null",
    "salary_max": "number or null",
    "equity_eligible": "boolean or null"
  },
  "skills": [{"name": "string"}],
  "summary": "one-sentence role summary"
}"#;

/// Build the classification prompt. The rules mirror the deterministic
/// post-processing so the model and the mapper never fight each other.
pub fn build_classification_prompt(raw_text: &str, structured: &StructuredInput) -> String {
    let mut prompt = String::with_capacity(raw_text.len() + 2048);

    prompt.push_str(
        "You are a job posting classifier. Classify the posting below into the \
         exact JSON schema that follows. Respond with a single JSON object and \
         nothing else.\n\nOutput schema:\n",
    );
    prompt.push_str(OUTPUT_SCHEMA);
    prompt.push_str(
        "\n\nRules:\n\
         1. When a field is unknown or not stated, use JSON null, never the string \"null\".\n\
         2. If the title contains \"Product Manager\", \"PM\", or \"GPM\", the role is in the \
            product family regardless of qualifiers: \"Data Product Manager\" is core_pm, \
            \"AI/ML PM\" is ai_ml_pm, never a data subfamily. The title is the deciding factor.\n\
         3. Seniority: explicitly stated years of experience are the primary signal; \
            title qualifiers are secondary. With neither, return null.\n\
         4. job_subfamily drives job_family downstream; pick the subfamily carefully, \
            the family may be recomputed from it.\n\
         5. Skills: extract tool and technology names only; families are assigned \
            deterministically later.\n",
    );

    let mut context = String::new();
    if let Some(title) = &structured.title {
        let _ = writeln!(context, "Title: {title}");
    }
    if let Some(company) = &structured.company {
        let _ = writeln!(context, "Company: {company}");
    }
    if let Some(location) = &structured.location {
        let _ = writeln!(context, "Location: {location}");
    }
    if let Some(category) = &structured.category {
        let _ = writeln!(context, "Listed category: {category}");
    }
    if let (Some(min), Some(max)) = (structured.salary_min, structured.salary_max) {
        let predicted = if structured.salary_predicted == Some(true) {
            " (model-predicted, advisory only)"
        } else {
            ""
        };
        let _ = writeln!(context, "Listed salary range: {min}-{max}{predicted}");
    }
    if let Some(level) = &structured.experience_level_hint {
        let _ = writeln!(context, "Listed experience level: {level}");
    }
    if let Some(workplace) = &structured.workplace_type_hint {
        let _ = writeln!(context, "Listed workplace type: {workplace}");
    }
    if let Some(is_remote) = structured.is_remote {
        let _ = writeln!(context, "Listed as remote: {is_remote}");
    }

    if !context.is_empty() {
        prompt.push_str("\nStructured context from the job board:\n");
        prompt.push_str(&context);
    }

    prompt.push_str("\nJob posting:\n");
    prompt.push_str(raw_text);
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_requires_title_company_or_category() {
        let mut input = StructuredInput::default();
        assert!(!input.has_context());
        input.location = Some("London".into());
        assert!(!input.has_context());
        input.category = Some("IT Jobs".into());
        assert!(input.has_context());
    }

    #[test]
    fn prompt_includes_schema_rules_and_context() {
        let input = StructuredInput {
            title: Some("Senior Data Engineer".into()),
            company: Some("Notion".into()),
            salary_min: Some(80_000.0),
            salary_max: Some(110_000.0),
            salary_predicted: Some(true),
            ..StructuredInput::default()
        };
        let prompt = build_classification_prompt("Build pipelines.", &input);
        assert!(prompt.contains("job_subfamily"));
        assert!(prompt.contains("never the string \"null\""));
        assert!(prompt.contains("Product Manager"));
        assert!(prompt.contains("Title: Senior Data Engineer"));
        assert!(prompt.contains("model-predicted"));
        assert!(prompt.ends_with("Build pipelines."));
    }

    #[test]
    fn bare_prompt_omits_the_context_block() {
        let prompt = build_classification_prompt("Some text.", &StructuredInput::default());
        assert!(!prompt.contains("Structured context"));
    }
}
