//! SMTP session state

use super::response::Reply;

/// A message received in full, ready to be delivered
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) struct Envelope {
    pub(super) from: String,
    pub(super) recipients: Vec<String>,
    pub(super) data: Vec<u8>,
}

/// What the connection should do after a line was handled
#[derive(Debug, PartialEq, Eq)]
pub(super) enum Step {
    /// Keep reading
    Continue,
    /// Send the reply and keep reading
    Reply(Reply),
    /// Send the reply and close the connection
    Close(Reply),
    /// Deliver the message, then reply with the outcome
    Deliver(Envelope),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Connected,
    Greeted,
    MailFrom,
    RcptTo,
    Data,
}

/// The state of a single SMTP conversation.
///
/// Lines are fed in as read from the wire, line terminator included. A line
/// without a terminator is the head of a line longer than the read limit; its
/// tail follows in the next call.
#[derive(Debug)]
pub(super) struct Session {
    hostname: String,
    max_message_bytes: usize,
    state: State,
    from: Option<String>,
    recipients: Vec<String>,
    data: Vec<u8>,
    oversized: bool,
    /// The previous line was complete
    at_line_start: bool,
}

impl Session {
    pub(super) fn new(hostname: &str, max_message_bytes: usize) -> Self {
        Self {
            hostname: hostname.to_string(),
            max_message_bytes,
            state: State::Connected,
            from: None,
            recipients: Vec::new(),
            data: Vec::new(),
            oversized: false,
            at_line_start: true,
        }
    }

    pub(super) fn greeting(&self) -> Reply {
        Reply::greeting(&self.hostname)
    }

    pub(super) fn handle_line(&mut self, line: &[u8]) -> Step {
        let starts_line = self.at_line_start;
        self.at_line_start = line.ends_with(b"\n");

        if self.state == State::Data {
            return self.data_line(line, starts_line);
        }

        if !self.at_line_start {
            // head of an overlong command; the reply goes out with its tail
            return Step::Continue;
        }
        if !starts_line {
            return Step::Reply(Reply::line_too_long());
        }

        self.command(&String::from_utf8_lossy(line))
    }

    fn command(&mut self, line: &str) -> Step {
        let line = line.trim_end_matches(['\r', '\n']);
        let (verb, args) = line
            .split_once(' ')
            .map(|(verb, args)| (verb, args.trim()))
            .unwrap_or((line, ""));

        let reply = match verb.to_ascii_uppercase().as_str() {
            "HELO" => self.hello(args, false),
            "EHLO" => self.hello(args, true),
            "MAIL" => self.mail(args),
            "RCPT" => self.rcpt(args),
            "DATA" => self.data(args),
            "RSET" => {
                self.reset();
                Reply::ok()
            }
            "NOOP" => Reply::ok(),
            "QUIT" => return Step::Close(Reply::closing(&self.hostname)),
            _ => Reply::unknown_command(),
        };

        Step::Reply(reply)
    }

    fn hello(&mut self, domain: &str, extended: bool) -> Reply {
        if domain.is_empty() {
            return Reply::syntax(if extended { "EHLO hostname" } else { "HELO hostname" });
        }

        self.clear_transaction();
        self.state = State::Greeted;

        if !extended {
            return Reply::new(250, self.hostname.clone());
        }

        Reply::multiline(
            250,
            vec![
                self.hostname.clone(),
                "8BITMIME".to_string(),
                format!("SIZE {}", self.max_message_bytes),
            ],
        )
    }

    fn mail(&mut self, args: &str) -> Reply {
        match self.state {
            State::Greeted => {}
            State::Connected => return Reply::bad_sequence("Send HELO/EHLO first"),
            _ => return Reply::bad_sequence("Sender already specified"),
        }

        let Some(sender) = strip_keyword(args, "FROM:").and_then(parse_path) else {
            return Reply::syntax("MAIL FROM:<address>");
        };

        self.from = Some(sender);
        self.state = State::MailFrom;

        Reply::ok()
    }

    fn rcpt(&mut self, args: &str) -> Reply {
        if !matches!(self.state, State::MailFrom | State::RcptTo) {
            return Reply::bad_sequence("Need MAIL before RCPT");
        }

        let Some(recipient) = strip_keyword(args, "TO:")
            .and_then(parse_path)
            .filter(|recipient| !recipient.is_empty())
        else {
            return Reply::syntax("RCPT TO:<address>");
        };

        self.recipients.push(recipient);
        self.state = State::RcptTo;

        Reply::ok()
    }

    fn data(&mut self, args: &str) -> Reply {
        if self.state != State::RcptTo {
            return Reply::bad_sequence("Need RCPT before DATA");
        }
        if !args.is_empty() {
            return Reply::syntax("DATA");
        }

        self.data.clear();
        self.oversized = false;
        self.state = State::Data;

        Reply::start_data()
    }

    fn data_line(&mut self, line: &[u8], starts_line: bool) -> Step {
        let mut line = line;

        if starts_line {
            if matches!(line, b".\r\n" | b".\n") {
                return self.finish_data();
            }
            line = line.strip_prefix(b".").unwrap_or(line);
        }

        if self.oversized {
            return Step::Continue;
        }

        if self.data.len() + line.len() > self.max_message_bytes {
            self.oversized = true;
            self.data = Vec::new();
        } else {
            self.data.extend_from_slice(line);
        }

        Step::Continue
    }

    fn finish_data(&mut self) -> Step {
        let from = self.from.take().unwrap_or_default();
        let recipients = std::mem::take(&mut self.recipients);
        let data = std::mem::take(&mut self.data);
        let oversized = std::mem::replace(&mut self.oversized, false);

        self.state = State::Greeted;

        if oversized {
            return Step::Reply(Reply::message_too_big());
        }

        Step::Deliver(Envelope {
            from,
            recipients,
            data,
        })
    }

    fn reset(&mut self) {
        self.clear_transaction();

        if self.state != State::Connected {
            self.state = State::Greeted;
        }
    }

    fn clear_transaction(&mut self) {
        self.from = None;
        self.recipients.clear();
        self.data.clear();
        self.oversized = false;
    }
}

/// Strips a case-insensitive `keyword` such as `FROM:` from the start of
/// `args`.
fn strip_keyword<'a>(args: &'a str, keyword: &str) -> Option<&'a str> {
    let head = args.get(..keyword.len())?;

    head.eq_ignore_ascii_case(keyword)
        .then(|| &args[keyword.len()..])
}

/// Extracts the address from `<address> [parameters]`. The angle brackets
/// may be omitted; `<>` yields an empty address.
fn parse_path(path: &str) -> Option<String> {
    let path = path.trim_start();

    let address = match path.strip_prefix('<') {
        Some(rest) => &rest[..rest.find('>')?],
        None => path.split_whitespace().next()?,
    };

    Some(address.trim().to_string())
}
