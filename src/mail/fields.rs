use std::collections::BTreeMap;

use tracing::debug;

use super::lines::{classify_line, Line, State, QUESTION_LABEL};

/// Everything pulled out of one message body.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractedFields {
    pub fields: BTreeMap<String, String>,
    pub url: Option<String>,
    pub url_parameters: Option<String>,
    pub question: Option<String>,
}

/// Run the line state machine over a message body.
///
/// A question body that is never terminated is still kept with whatever was
/// captured.
pub fn extract_fields<'a, I>(lines: I) -> ExtractedFields
where
    I: IntoIterator<Item = &'a str>,
{
    let mut out = ExtractedFields::default();
    let mut state = State::Normal;
    let mut question = String::new();

    for line in lines {
        match classify_line(line, state) {
            Line::QuestionStart(first) => {
                question.push_str(first);
                state = State::InQuestionBody;
            }
            Line::QuestionText(text) => question.push_str(text),
            Line::QuestionTerminator => {
                out.question = Some(std::mem::take(&mut question));
                state = State::Normal;
            }
            Line::UrlLine { url, parameters } => {
                out.url = Some(url.to_string());
                out.url_parameters = Some(parameters.to_string());
            }
            Line::KeyValue { label, value } => {
                out.fields.insert(label.to_string(), value.to_string());
            }
            Line::Malformed => debug!(line, "Skipping malformed line"),
            Line::Ignored => {}
        }
    }

    if state == State::InQuestionBody {
        debug!("{} body not terminated, keeping partial text", QUESTION_LABEL);
        out.question = Some(question);
    }
    out
}

/// Convenience over a whole body string.
pub fn extract_body(body: &str) -> ExtractedFields {
    extract_fields(body.lines())
}
