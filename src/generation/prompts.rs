/// Languages the scanner can simplify into, by code.
const LANGUAGES: &[(&str, &str)] = &[
    ("en", "English"),
    ("mr", "Marathi"),
    ("hi", "Hindi"),
    ("gu", "Gujarati"),
];

pub const OCR_PROMPT: &str = "Extract all text from this image, keeping its line breaks and \
structure. Keep the text in its original language; do not translate it.";

pub fn language_name(code: &str) -> Option<&'static str> {
    let code = code.trim();
    LANGUAGES
        .iter()
        .find(|(c, _)| c.eq_ignore_ascii_case(code))
        .map(|(_, name)| *name)
}

/// `language` may be a code or a language name; blank means English.
pub fn generation_prompt(document: &str, user_inputs: &str, language: Option<&str>) -> String {
    let language = match language.map(str::trim) {
        Some(l) if !l.is_empty() => language_name(l).unwrap_or(l),
        _ => "English",
    };
    format!(
        "Draft a professionally formatted legal document.\n\
         Document type: {document}\n\
         Details from the user: {user_inputs}\n\
         Language: {language}\n\
         Use a bold title, headed sections (parties, terms, signatures), formal legal wording, \
         and end with placeholders for signatures, dates, and witnesses."
    )
}

/// `None` keeps the language of the input text.
pub fn simplify_prompt(text: &str, language: Option<&str>) -> String {
    let target = match language {
        Some(name) => format!("Write the result in {name}, translating if needed."),
        None => "Write the result in the same language as the input; do not translate.".into(),
    };
    format!(
        "Rewrite the following legal text so a non-lawyer can understand it. Keep the meaning \
         accurate, use short sentences, and explain important legal terms in parentheses. \
         {target}\n\n{text}"
    )
}
