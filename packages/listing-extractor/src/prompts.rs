//! LLM prompts for listing extraction and pagination discovery.

use crate::types::schema::ExtractionSchema;

/// System prompt shared by every extraction call.
pub const EXTRACT_SYSTEM_PROMPT: &str = r#"You are a precise data extraction assistant.
You read the text of a single web page and return every listing it contains as structured data.

Rules:
- Extract only the requested fields: {fields}.
- Every listing must contain every requested field. Use an empty string when the page does not state a value.
- Copy values as they appear on the page. Do not invent, summarize or translate them.
- Return pure JSON with this shape and nothing else:
{shape}"#;

/// Extra rules for backends that are not constrained by a response schema.
pub const PLAIN_JSON_RULES: &str = r#"
Respond with a single JSON object. Do not wrap it in markdown code fences.
Do not add commentary before or after the JSON."#;

/// User message prefix; the page text follows it.
pub const EXTRACT_USER_PROMPT: &str = "Extract the requested information from the following page content:\n\n";

/// System prompt for pagination discovery.
pub const PAGINATION_SYSTEM_PROMPT: &str = r#"You are an assistant that finds pagination links on web pages.
Given the text of a page, identify the URLs of the other pages of the same listing
(page 2, page 3, "next", numbered page links, "load more" endpoints).

Rules:
- Return absolute URLs when the page shows them; relative paths are acceptable otherwise.
- Follow the URL pattern of the page when links are implied (e.g. ?page=2, /page/3).
- Do not return links to unrelated pages (login, contact, categories, social media).
- If the page has no pagination, return an empty list.
- Return pure JSON of the form {"page_urls": ["..."]}"#;

/// User prompt for pagination discovery.
pub const PAGINATION_USER_PROMPT: &str = r#"Page URL: {url}
{hint}
Page content:

{content}"#;

/// Render the extraction system prompt for a schema.
///
/// `plain_json` adds the stricter output rules used by backends that cannot
/// enforce a response schema themselves.
pub fn format_extract_system_prompt(schema: &ExtractionSchema, plain_json: bool) -> String {
    let fields = schema.requested_names().join(", ");
    let mut prompt = EXTRACT_SYSTEM_PROMPT
        .replace("{fields}", &fields)
        .replace("{shape}", &schema.shape_hint());
    if plain_json {
        prompt.push_str(PLAIN_JSON_RULES);
    }
    prompt
}

/// Render the extraction user message.
pub fn format_extract_user_prompt(content: &str) -> String {
    format!("{}{}", EXTRACT_USER_PROMPT, content)
}

/// Render the pagination user message.
pub fn format_pagination_user_prompt(url: &str, hint: Option<&str>, content: &str) -> String {
    let hint = match hint.map(str::trim).filter(|h| !h.is_empty()) {
        Some(h) => format!("Pagination details from the user: {}\n", h),
        None => String::new(),
    };
    PAGINATION_USER_PROMPT
        .replace("{url}", url)
        .replace("{hint}\n", &hint)
        .replace("{content}", content)
}
