pub const SEPARATOR: char = ':';
pub const QUESTION_LABEL: &str = "Question";
pub const QUESTION_TERMINATOR: &str = "How did you hear about";
pub const URL_PREAMBLE: &str = "The following inquiry";
pub const EXCLUDED_PREFIX: &str = "NOTE TO";
pub const NO_PARAMETER: &str = "No Parameter";

/// Where the extractor is within a message body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Normal,
    InQuestionBody,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Line<'a> {
    KeyValue { label: &'a str, value: &'a str },
    UrlLine { url: &'a str, parameters: &'a str },
    QuestionStart(&'a str),
    QuestionText(&'a str),
    QuestionTerminator,
    Ignored,
    Malformed,
}

/// Classify one body line given the extractor's current state.
pub fn classify_line(line: &str, state: State) -> Line<'_> {
    match state {
        State::InQuestionBody if line.starts_with(QUESTION_TERMINATOR) => Line::QuestionTerminator,
        State::InQuestionBody => Line::QuestionText(line),
        State::Normal => classify_normal(line),
    }
}

fn classify_normal(line: &str) -> Line<'_> {
    if line.is_empty() || !line.contains(SEPARATOR) || line.starts_with(EXCLUDED_PREFIX) {
        return Line::Ignored;
    }

    if line.starts_with(URL_PREAMBLE) {
        let Some(start) = line.find("http") else {
            return Line::Malformed;
        };
        let link = line[start..].trim_end();
        return match link.split_once('?') {
            Some((url, params)) if !params.is_empty() => Line::UrlLine { url, parameters: params },
            Some((url, _)) => Line::UrlLine { url, parameters: NO_PARAMETER },
            None => Line::UrlLine { url: link, parameters: NO_PARAMETER },
        };
    }

    let (label, value) = line.split_once(SEPARATOR).unwrap_or((line, ""));
    if label.starts_with(QUESTION_LABEL) {
        return Line::QuestionStart(value.trim());
    }

    let (label, value) = (label.trim(), value.trim());
    if label.is_empty() || value.is_empty() {
        return Line::Malformed;
    }
    Line::KeyValue { label, value }
}
