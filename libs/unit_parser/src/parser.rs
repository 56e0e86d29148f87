//! Line level parsing of unit files.
use crate::error::*;
use nom::{
    bytes::complete::take_till1,
    character::complete::{char, space0},
    combinator::eof,
    sequence::{delimited, tuple},
    IResult,
};

/// One line after continuation joining, tagged with the line it started on.
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct LogicalLine {
    pub(crate) number: usize,
    pub(crate) text: String,
}

/// What a logical line turned out to be.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Line<'a> {
    Blank,
    Section(&'a str),
    Entry(&'a str, &'a str),
}

fn is_comment(line: &str) -> bool {
    line.starts_with('#') || line.starts_with(';')
}

/// Join lines ending in a backslash with their successor. The backslash is
/// replaced by one space; comment lines are dropped, also in the middle of
/// a continuation.
pub(crate) fn logical_lines(input: &str) -> Vec<LogicalLine> {
    let mut result = Vec::new();
    let mut pending: Option<LogicalLine> = None;

    for (idx, raw) in input.lines().enumerate() {
        let line = raw.strip_suffix('\r').unwrap_or(raw);
        if is_comment(line.trim_start()) {
            continue;
        }

        let (body, continues) = match line.strip_suffix('\\') {
            Some(body) => (body, true),
            None => (line, false),
        };

        let mut current = match pending.take() {
            Some(mut p) => {
                p.text.push_str(body);
                p
            }
            None => LogicalLine {
                number: idx + 1,
                text: body.to_string(),
            },
        };

        if continues {
            current.text.push(' ');
            pending = Some(current);
        } else {
            result.push(current);
        }
    }

    if let Some(p) = pending {
        result.push(p);
    }

    result
}

fn section_header(i: &str) -> IResult<&str, &str> {
    let (i, (_, name, _, _)) = tuple((
        space0,
        delimited(char('['), take_till1(|c: char| c == ']' || c == '['), char(']')),
        space0,
        eof,
    ))(i)?;
    Ok((i, name))
}

// returns (key, value) pair, the value is everything after '=' minus
// surrounding whitespace
fn entry(i: &str) -> IResult<&str, (&str, &str)> {
    let (i, (_, key, _)) = tuple((
        space0,
        take_till1(|c: char| c == '=' || c.is_whitespace() || c == '['),
        delimited(space0, char('='), space0),
    ))(i)?;
    Ok(("", (key, i.trim_end())))
}

/// Classify one logical line.
pub(crate) fn parse_line(line: &LogicalLine) -> Result<Line<'_>> {
    let text = line.text.as_str();
    if text.trim().is_empty() {
        return Ok(Line::Blank);
    }

    if let Ok((_, name)) = section_header(text) {
        return Ok(Line::Section(name));
    }

    if let Ok((_, (key, value))) = entry(text) {
        return Ok(Line::Entry(key, value));
    }

    Err(Error::Syntax {
        line: line.number,
        content: text.trim().to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ll(number: usize, text: &str) -> LogicalLine {
        LogicalLine {
            number,
            text: text.to_string(),
        }
    }

    #[test]
    fn test_logical_lines_continuation() {
        let input = "[Install]\nWantedBy=a.service \\\n  b.service\nAlias=x.service\n";
        let lines = logical_lines(input);
        assert_eq!(
            lines,
            vec![
                ll(1, "[Install]"),
                ll(2, "WantedBy=a.service    b.service"),
                ll(4, "Alias=x.service"),
            ]
        );
    }

    #[test]
    fn test_logical_lines_comments() {
        let input = "# leading\nKey=a \\\n# inside\n; also inside\nb\n  ; indented\r\nOther=c\r\n";
        let lines = logical_lines(input);
        assert_eq!(lines, vec![ll(2, "Key=a  b"), ll(7, "Other=c")]);
    }

    #[test]
    fn test_logical_lines_trailing_continuation() {
        let lines = logical_lines("Key=a \\");
        assert_eq!(lines, vec![ll(1, "Key=a  ")]);
    }

    #[test]
    fn test_parse_line() {
        assert_eq!(parse_line(&ll(1, "   ")).unwrap(), Line::Blank);
        assert_eq!(
            parse_line(&ll(1, "[Install]")).unwrap(),
            Line::Section("Install")
        );
        assert_eq!(
            parse_line(&ll(1, " [X-Foo Bar] ")).unwrap(),
            Line::Section("X-Foo Bar")
        );
        assert_eq!(
            parse_line(&ll(1, "Alias = a.service \"b c.service\"  ")).unwrap(),
            Line::Entry("Alias", "a.service \"b c.service\"")
        );
        assert_eq!(
            parse_line(&ll(1, "Environment=")).unwrap(),
            Line::Entry("Environment", "")
        );
        assert_eq!(
            parse_line(&ll(1, "Exec=a=b")).unwrap(),
            Line::Entry("Exec", "a=b")
        );
    }

    #[test]
    fn test_parse_line_errors() {
        for bad in ["[Install", "just words", "=value", "[]"] {
            match parse_line(&ll(3, bad)) {
                Err(Error::Syntax { line, .. }) => assert_eq!(line, 3),
                other => panic!("unexpected {:?} for {}", other, bad),
            }
        }
    }
}
