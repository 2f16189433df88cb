//! Envelope extraction from raw message headers.
//!
//! Only the header block is read. Address lists follow RFC 5322 closely
//! enough for real mail: quoted display names, angle-addr, trailing
//! comments and groups. Display names may carry RFC 2047 encoded words.

use std::io::{self, BufRead};

use base64::Engine;
use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD};

use crate::worker::types::{Address, Envelope};

/// Unfolded header fields in file order, with lowercase names.
#[derive(Debug, Clone, Default)]
pub struct Headers {
    fields: Vec<(String, String)>,
}

impl Headers {
    /// Reads the header block (everything up to the first empty line).
    ///
    /// Bytes that are not valid UTF-8 are replaced.
    ///
    /// # Errors
    ///
    /// Returns an error if reading fails.
    pub fn read<R: BufRead>(mut reader: R) -> io::Result<Self> {
        let mut block = Vec::new();
        let mut line = Vec::new();
        loop {
            line.clear();
            if reader.read_until(b'\n', &mut line)? == 0 {
                break;
            }
            if line == b"\n" || line == b"\r\n" {
                break;
            }
            block.extend_from_slice(&line);
        }
        Ok(Self::parse(&String::from_utf8_lossy(&block)))
    }

    /// Parses a header block, joining continuation lines.
    #[must_use]
    pub fn parse(text: &str) -> Self {
        let mut headers = Self::default();
        let mut current: Option<(String, String)> = None;

        for line in text.lines() {
            if line.is_empty() {
                break;
            }

            if line.starts_with(' ') || line.starts_with('\t') {
                if let Some((_, value)) = current.as_mut() {
                    value.push(' ');
                    value.push_str(line.trim());
                }
                continue;
            }

            if let Some(field) = current.take() {
                headers.fields.push(field);
            }
            if let Some((name, value)) = line.split_once(':') {
                current = Some((name.trim().to_lowercase(), value.trim().to_string()));
            }
        }

        if let Some(field) = current {
            headers.fields.push(field);
        }
        headers
    }

    /// Returns every value of the named field.
    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.fields
            .iter()
            .filter(move |(field, _)| field.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Builds the envelope from the address fields.
    #[must_use]
    pub fn envelope(&self) -> Envelope {
        let list = |name: &str| -> Vec<Address> {
            self.get_all(name).flat_map(parse_address_list).collect()
        };
        Envelope {
            from: list("from"),
            reply_to: list("reply-to"),
            to: list("to"),
            cc: list("cc"),
            bcc: list("bcc"),
        }
    }
}

/// Parses an RFC 5322 address list.
///
/// Group names are dropped and their members kept. Entries without an
/// address are skipped.
#[must_use]
pub fn parse_address_list(value: &str) -> Vec<Address> {
    let mut addresses = Vec::new();
    let mut item = String::new();
    let mut in_quotes = false;
    let mut escaped = false;
    let mut angle = false;
    let mut comment_depth = 0_usize;

    for ch in value.chars() {
        if escaped {
            item.push(ch);
            escaped = false;
            continue;
        }
        match ch {
            '\\' if in_quotes || comment_depth > 0 => {
                item.push(ch);
                escaped = true;
            }
            '"' if comment_depth == 0 => {
                in_quotes = !in_quotes;
                item.push(ch);
            }
            '(' if !in_quotes => {
                comment_depth += 1;
                item.push(ch);
            }
            ')' if !in_quotes && comment_depth > 0 => {
                comment_depth -= 1;
                item.push(ch);
            }
            '<' if !in_quotes && comment_depth == 0 => {
                angle = true;
                item.push(ch);
            }
            '>' if !in_quotes && comment_depth == 0 => {
                angle = false;
                item.push(ch);
            }
            ':' if !in_quotes && comment_depth == 0 && !angle => {
                // Group display name.
                item.clear();
            }
            ',' | ';' if !in_quotes && comment_depth == 0 && !angle => {
                addresses.extend(parse_mailbox(&item));
                item.clear();
            }
            _ => item.push(ch),
        }
    }
    addresses.extend(parse_mailbox(&item));
    addresses
}

/// Parses one mailbox: `Name <addr>`, `"Name" <addr>`, `addr (Name)` or
/// a bare `addr`.
fn parse_mailbox(text: &str) -> Option<Address> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    if let Some(open) = text.rfind('<') {
        let close = text[open..].find('>').map_or(text.len(), |i| open + i);
        let email = text[open + 1..close].trim();
        if email.is_empty() {
            return None;
        }
        let name = strip_comments(&text[..open]);
        return Some(Address::new(display_name(&name), email));
    }

    let email = strip_comments(text);
    let email = email.trim();
    if email.is_empty() {
        return None;
    }
    let name = first_comment(text).map(|c| display_name(&c)).unwrap_or_default();
    Some(Address::new(name, email))
}

/// Removes `( ... )` comments outside quoted strings.
fn strip_comments(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut depth = 0_usize;
    let mut in_quotes = false;
    let mut escaped = false;

    for ch in text.chars() {
        if escaped {
            if depth == 0 {
                out.push(ch);
            }
            escaped = false;
            continue;
        }
        match ch {
            '\\' if in_quotes || depth > 0 => {
                if depth == 0 {
                    out.push(ch);
                }
                escaped = true;
            }
            '"' if depth == 0 => {
                in_quotes = !in_quotes;
                out.push(ch);
            }
            '(' if !in_quotes => depth += 1,
            ')' if !in_quotes && depth > 0 => depth -= 1,
            _ if depth == 0 => out.push(ch),
            _ => {}
        }
    }
    out
}

/// Returns the text of the first top-level comment.
fn first_comment(text: &str) -> Option<String> {
    let start = text.find('(')?;
    let end = text.rfind(')')?;
    (end > start).then(|| text[start + 1..end].to_string())
}

/// Unquotes and decodes a display name.
fn display_name(raw: &str) -> String {
    let raw = raw.trim();
    let unquoted = if raw.len() >= 2 && raw.starts_with('"') && raw.ends_with('"') {
        unescape(&raw[1..raw.len() - 1])
    } else {
        raw.replace('"', "")
    };
    decode_encoded_words(unquoted.trim())
}

fn unescape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(ch) = chars.next() {
        if ch == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(ch);
        }
    }
    out
}

/// Decodes every RFC 2047 encoded word in `text`.
///
/// Whitespace between two adjacent encoded words is dropped. Words that do
/// not decode are kept verbatim.
#[must_use]
pub fn decode_encoded_words(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    let mut after_word = false;

    while let Some(start) = rest.find("=?") {
        let (before, candidate) = rest.split_at(start);
        if let Some((decoded, consumed)) = decode_word(candidate) {
            if !(after_word && before.trim().is_empty()) {
                out.push_str(before);
            }
            out.push_str(&decoded);
            rest = &candidate[consumed..];
            after_word = true;
        } else {
            out.push_str(before);
            out.push_str("=?");
            rest = &candidate[2..];
            after_word = false;
        }
    }
    out.push_str(rest);
    out
}

/// Decodes one `=?charset?encoding?text?=` word at the start of `text`,
/// returning the decoded string and the number of bytes consumed.
fn decode_word(text: &str) -> Option<(String, usize)> {
    let inner = text.strip_prefix("=?")?;
    let (charset, after) = inner.split_once('?')?;
    let (encoding, after) = after.split_once('?')?;
    let end = after.find("?=")?;
    let payload = &after[..end];
    let consumed = 2 + charset.len() + 1 + encoding.len() + 1 + end + 2;

    let bytes = match encoding {
        "B" | "b" => STANDARD
            .decode(payload)
            .or_else(|_| STANDARD_NO_PAD.decode(payload))
            .ok()?,
        "Q" | "q" => decode_q(payload)?,
        _ => return None,
    };

    let charset = charset.split('*').next().unwrap_or(charset);
    let decoded = if charset.eq_ignore_ascii_case("iso-8859-1")
        || charset.eq_ignore_ascii_case("latin1")
    {
        bytes.iter().map(|&b| char::from(b)).collect()
    } else {
        String::from_utf8_lossy(&bytes).into_owned()
    };
    Some((decoded, consumed))
}

/// Decodes the `Q` encoding: `_` is a space, `=XX` a hex byte.
fn decode_q(payload: &str) -> Option<Vec<u8>> {
    let mut out = Vec::with_capacity(payload.len());
    let mut bytes = payload.bytes();
    while let Some(byte) = bytes.next() {
        match byte {
            b'_' => out.push(b' '),
            b'=' => {
                let hi = bytes.next()?;
                let lo = bytes.next()?;
                let hex = [hi, lo];
                let hex = std::str::from_utf8(&hex).ok()?;
                out.push(u8::from_str_radix(hex, 16).ok()?);
            }
            _ => out.push(byte),
        }
    }
    Some(out)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn emails(list: &[Address]) -> Vec<(&str, &str)> {
        list.iter()
            .map(|a| (a.name.as_str(), a.email.as_str()))
            .collect()
    }

    #[test]
    fn test_headers_parse_folds_lines() {
        let text = concat!(
            "From: Alice <alice@example.com>\r\n",
            "To: bob@example.com,\r\n",
            "\tcarol@example.com\r\n",
            "Subject: hi\r\n",
            "\r\n",
            "To: body@example.com\r\n",
        );
        let headers = Headers::parse(text);
        let to: Vec<_> = headers.get_all("To").collect();
        assert_eq!(to, vec!["bob@example.com, carol@example.com"]);
    }

    #[test]
    fn test_headers_read_stops_at_body() {
        let raw = b"Cc: a@x.org\nCC: b@x.org\n\nFrom: nobody@x.org\n";
        let headers = Headers::read(&raw[..]).unwrap();
        assert_eq!(headers.get_all("cc").count(), 2);
        assert_eq!(headers.get_all("from").count(), 0);
    }

    #[test]
    fn test_parse_plain_list() {
        let list = parse_address_list("a@x.org, b@y.org");
        assert_eq!(emails(&list), vec![("", "a@x.org"), ("", "b@y.org")]);
    }

    #[test]
    fn test_parse_display_names() {
        let list = parse_address_list(
            r#""Doe, Jane" <jane@x.org>, Bob Smith <bob@y.org>, "Q \"Quote\"" <q@z.org>"#,
        );
        assert_eq!(
            emails(&list),
            vec![
                ("Doe, Jane", "jane@x.org"),
                ("Bob Smith", "bob@y.org"),
                ("Q \"Quote\"", "q@z.org"),
            ]
        );
    }

    #[test]
    fn test_parse_comment_name() {
        let list = parse_address_list("carol@x.org (Carol Jones)");
        assert_eq!(emails(&list), vec![("Carol Jones", "carol@x.org")]);
    }

    #[test]
    fn test_parse_group() {
        let list = parse_address_list("Team: a@x.org, B <b@x.org>;, c@x.org");
        assert_eq!(
            emails(&list),
            vec![("", "a@x.org"), ("B", "b@x.org"), ("", "c@x.org")]
        );
        assert!(parse_address_list("undisclosed-recipients:;").is_empty());
    }

    #[test]
    fn test_decode_encoded_words() {
        assert_eq!(decode_encoded_words("=?UTF-8?B?SsO2cmc=?="), "Jörg");
        assert_eq!(decode_encoded_words("=?iso-8859-1?Q?J=F6rg_M?="), "Jörg M");
        assert_eq!(
            decode_encoded_words("=?utf-8?q?Ren=C3=A9?= =?utf-8?q?_Dupont?="),
            "René Dupont"
        );
        assert_eq!(decode_encoded_words("plain =?bad"), "plain =?bad");
    }

    #[test]
    fn test_encoded_display_name() {
        let list = parse_address_list("=?UTF-8?B?SsO2cmc=?= <jorg@x.de>");
        assert_eq!(emails(&list), vec![("Jörg", "jorg@x.de")]);
    }

    #[test]
    fn test_envelope_from_headers() {
        let headers = Headers::parse(concat!(
            "From: Alice <alice@x.org>\n",
            "Reply-To: list@x.org\n",
            "To: bob@x.org\n",
            "Cc: carol@x.org, dave@x.org\n",
        ));
        let envelope = headers.envelope();
        assert_eq!(envelope.from.len(), 1);
        assert_eq!(envelope.reply_to.len(), 1);
        assert_eq!(envelope.to.len(), 1);
        assert_eq!(envelope.cc.len(), 2);
        assert!(envelope.bcc.is_empty());
    }
}
