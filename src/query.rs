//! A single GTP request and the response assembled for it.
//!
//! The dispatcher thread of the transport feeds every line read from the
//! engine into [`Query::absorb_line`]; the query tells it when the response
//! is complete and which lines have to be mirrored into the analysis stream.

/// How the response of a query is consumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryKind {
    /// Plain request/response.
    Normal,
    /// The engine streams analysis lines before the terminating blank line.
    Analysis,
}

impl QueryKind {
    /// Guesses the kind from a command name (`lz-analyze`, `kata-genmove_analyze`, ...).
    pub fn for_command(name: &str) -> QueryKind {
        let parts: Vec<_> = name.split('-').collect();
        let is_analysis = parts.len() <= 2
            && matches!(
                parts.last(),
                Some(&"analyze") | Some(&"genmove_analyze")
            );
        if is_analysis {
            QueryKind::Analysis
        } else {
            QueryKind::Normal
        }
    }
}

/// Leading marker of a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// No marker seen yet.
    Unset,
    /// `=`
    Success,
    /// `?`
    Failure,
}

/// Kind of a streamed analysis event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisKind {
    /// Intermediate search information.
    Info,
    /// A line announcing the move played.
    Play,
    /// The analysis response is over.
    End,
}

/// One line of streamed analysis output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisEvent {
    /// What the line carries.
    pub kind: AnalysisKind,
    /// The line itself, `None` for [`AnalysisKind::End`].
    pub line: Option<String>,
}

/// Result of feeding one line to a query.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum LineOutcome {
    /// The response goes on.
    Pending(Option<AnalysisEvent>),
    /// The blank terminator was read.
    Complete(Option<AnalysisEvent>),
}

/// One outgoing command line and its response.
#[derive(Debug, Clone)]
pub struct Query {
    command: String,
    kind: QueryKind,
    status: Status,
    response: Vec<String>,
}

impl Query {
    /// Creates a query; surrounding whitespace of the command is dropped.
    pub fn new(command: &str, kind: QueryKind) -> Query {
        Query {
            command: command.trim().to_string(),
            kind,
            status: Status::Unset,
            response: vec![],
        }
    }

    /// The command line, without its newline.
    pub fn command(&self) -> &str {
        &self.command
    }

    /// First word of the command.
    pub fn main_command(&self) -> Option<&str> {
        self.command.split_whitespace().next()
    }

    /// Normal or analysis.
    pub fn kind(&self) -> QueryKind {
        self.kind
    }

    /// Marker recorded from the first response line.
    pub fn status(&self) -> Status {
        self.status
    }

    /// True when the engine answered with `?`.
    pub fn failed(&self) -> bool {
        self.status == Status::Failure
    }

    /// Response lines, markers stripped.
    pub fn lines(&self) -> &[String] {
        &self.response
    }

    /// Response lines joined with newlines and trimmed.
    pub fn text(&self) -> String {
        self.response.join("\n").trim().to_string()
    }

    /// Feeds one raw line read from the engine.
    pub(crate) fn absorb_line(&mut self, raw: &str) -> LineOutcome {
        let mut line = raw.trim();

        if line.is_empty() {
            let end = (self.kind == QueryKind::Analysis).then_some(AnalysisEvent {
                kind: AnalysisKind::End,
                line: None,
            });
            return LineOutcome::Complete(end);
        }

        if self.status == Status::Unset {
            if let Some(rest) = line.strip_prefix('=') {
                self.status = Status::Success;
                line = rest.trim();
            } else if let Some(rest) = line.strip_prefix('?') {
                self.status = Status::Failure;
                line = rest.trim();
            }
        }

        let event = (self.kind == QueryKind::Analysis && !line.is_empty()).then(|| {
            let kind = if line.contains("play") {
                AnalysisKind::Play
            } else {
                AnalysisKind::Info
            };
            AnalysisEvent {
                kind,
                line: Some(line.to_string()),
            }
        });

        self.response.push(line.to_string());
        LineOutcome::Pending(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_marker_is_stripped() {
        let mut query = Query::new("name\n", QueryKind::Normal);
        assert_eq!(query.command(), "name");
        assert_eq!(query.absorb_line("= GnuGo\n"), LineOutcome::Pending(None));
        assert_eq!(query.absorb_line("\n"), LineOutcome::Complete(None));
        assert_eq!(query.status(), Status::Success);
        assert_eq!(query.text(), "GnuGo");
    }

    #[test]
    fn only_first_marker_counts() {
        let mut query = Query::new("list_commands", QueryKind::Normal);
        query.absorb_line("? unknown");
        query.absorb_line("= not a marker anymore");
        assert!(query.failed());
        assert_eq!(query.lines(), ["unknown", "= not a marker anymore"]);
    }

    #[test]
    fn bare_marker_gives_empty_payload() {
        let mut query = Query::new("clear_board", QueryKind::Normal);
        query.absorb_line("=");
        query.absorb_line("");
        assert_eq!(query.status(), Status::Success);
        assert_eq!(query.text(), "");
    }

    #[test]
    fn analysis_lines_are_mirrored() {
        let mut query = Query::new("lz-genmove_analyze b 10", QueryKind::Analysis);
        assert_eq!(query.absorb_line("="), LineOutcome::Pending(None));
        let LineOutcome::Pending(Some(info)) = query.absorb_line("info move D4 visits 3") else {
            panic!("expected an info event");
        };
        assert_eq!(info.kind, AnalysisKind::Info);
        let LineOutcome::Pending(Some(play)) = query.absorb_line("play D4") else {
            panic!("expected a play event");
        };
        assert_eq!(play.kind, AnalysisKind::Play);
        assert_eq!(play.line.as_deref(), Some("play D4"));
        let LineOutcome::Complete(Some(end)) = query.absorb_line("") else {
            panic!("expected an end event");
        };
        assert_eq!(end.kind, AnalysisKind::End);
    }

    #[test]
    fn analysis_kind_detection() {
        assert_eq!(QueryKind::for_command("lz-analyze"), QueryKind::Analysis);
        assert_eq!(
            QueryKind::for_command("kata-genmove_analyze"),
            QueryKind::Analysis
        );
        assert_eq!(QueryKind::for_command("analyze"), QueryKind::Analysis);
        assert_eq!(QueryKind::for_command("genmove"), QueryKind::Normal);
        assert_eq!(QueryKind::for_command("a-b-analyze"), QueryKind::Normal);
    }
}
