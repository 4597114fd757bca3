use super::{Dom, NodeId};

pub(super) const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style", "textarea", "title"];

/// Opening one of these closes an open `<p>`.
const CLOSES_PARAGRAPH: &[&str] = &[
    "address", "article", "aside", "blockquote", "details", "div", "dl", "fieldset", "figure",
    "footer", "form", "h1", "h2", "h3", "h4", "h5", "h6", "header", "hr", "main", "nav", "ol",
    "p", "pre", "section", "table", "ul",
];

struct StartTag {
    name: String,
    attrs: Vec<(String, String)>,
    self_closing: bool,
}

pub(super) fn parse_into(dom: &mut Dom, parent: NodeId, html: &str) {
    let mut parser = Parser {
        src: html,
        pos: 0,
        text_start: 0,
        stack: vec![parent],
    };
    parser.run(dom);
}

struct Parser<'a> {
    src: &'a str,
    pos: usize,
    text_start: usize,
    stack: Vec<NodeId>,
}

impl<'a> Parser<'a> {
    fn run(&mut self, dom: &mut Dom) {
        let bytes = self.src.as_bytes();
        while self.pos < bytes.len() {
            if bytes[self.pos] != b'<' {
                self.pos += 1;
                continue;
            }
            let rest = &self.src[self.pos..];
            if rest.starts_with("<!--") {
                let body_start = self.pos + 4;
                let (body_end, next) = match self.src[body_start..].find("-->") {
                    Some(end) => (body_start + end, body_start + end + 3),
                    None => (self.src.len(), self.src.len()),
                };
                self.flush_text(dom, self.pos);
                let comment = dom.create_comment(&self.src[body_start..body_end]);
                dom.append_child(self.current(), comment);
                self.pos = next;
                self.text_start = next;
            } else if rest.starts_with("<!") || rest.starts_with("<?") {
                let next = match rest.find('>') {
                    Some(end) => self.pos + end + 1,
                    None => self.src.len(),
                };
                self.flush_text(dom, self.pos);
                self.pos = next;
                self.text_start = next;
            } else if rest.starts_with("</") {
                match parse_end_tag(rest) {
                    Some((name, consumed)) => {
                        self.flush_text(dom, self.pos);
                        self.close_element(dom, &name);
                        self.pos += consumed;
                        self.text_start = self.pos;
                    }
                    None => self.pos += 1,
                }
            } else if rest[1..].starts_with(|c: char| c.is_ascii_alphabetic()) {
                match parse_start_tag(rest) {
                    Some((tag, consumed)) => {
                        self.flush_text(dom, self.pos);
                        self.pos += consumed;
                        self.text_start = self.pos;
                        self.open_element(dom, tag);
                    }
                    None => self.pos += 1,
                }
            } else {
                self.pos += 1;
            }
        }
        self.flush_text(dom, self.src.len());
    }

    fn current(&self) -> NodeId {
        *self.stack.last().unwrap_or(&self.stack[0])
    }

    /// Any `<` left in a text run did not open a tag, so it is stored as
    /// `&lt;` and the serialised form parses back to the same tree.
    fn flush_text(&mut self, dom: &mut Dom, end: usize) {
        if end > self.text_start {
            let raw = self.src[self.text_start..end].replace('<', "&lt;");
            let text = dom.create_raw_text(&raw);
            dom.append_child(self.current(), text);
        }
        self.text_start = end;
    }

    fn open_element(&mut self, dom: &mut Dom, tag: StartTag) {
        self.close_implied(dom, &tag.name);

        let element = dom.create_element(&tag.name);
        for (name, value) in &tag.attrs {
            if dom.attr(element, name).is_none() {
                dom.set_attr(element, name, value);
            }
        }
        dom.append_child(self.current(), element);

        if VOID_ELEMENTS.contains(&tag.name.as_str()) || tag.self_closing {
            return;
        }

        if RAW_TEXT_ELEMENTS.contains(&tag.name.as_str()) {
            let closing = format!("</{}", tag.name);
            let body_start = self.pos;
            let lowered = self.src[body_start..].to_ascii_lowercase();
            let body_end = lowered
                .find(&closing)
                .map(|offset| body_start + offset)
                .unwrap_or(self.src.len());
            if body_end > body_start {
                let text = dom.create_raw_text(&self.src[body_start..body_end]);
                dom.append_child(element, text);
            }
            let after = match self.src[body_end..].find('>') {
                Some(end) => body_end + end + 1,
                None => self.src.len(),
            };
            self.pos = after;
            self.text_start = after;
            return;
        }

        self.stack.push(element);
    }

    fn close_implied(&mut self, dom: &Dom, tag: &str) {
        match tag {
            "li" => self.close_until(dom, &["li"], &["ul", "ol"]),
            "td" | "th" => self.close_until(dom, &["td", "th"], &["tr", "table"]),
            "tr" => self.close_until(dom, &["tr"], &["table", "thead", "tbody", "tfoot"]),
            "thead" | "tbody" | "tfoot" => {
                self.close_until(dom, &["thead", "tbody", "tfoot"], &["table"])
            }
            "dt" | "dd" => self.close_until(dom, &["dt", "dd"], &["dl"]),
            _ => {}
        }
        if CLOSES_PARAGRAPH.contains(&tag) {
            if let Some(top) = self.stack.last().copied() {
                if self.stack.len() > 1 && dom.is_tag(top, "p") {
                    self.stack.pop();
                }
            }
        }
    }

    /// Pops the nearest open element named in `targets`, unless one of the
    /// `boundaries` is open above it.
    fn close_until(&mut self, dom: &Dom, targets: &[&str], boundaries: &[&str]) {
        for index in (1..self.stack.len()).rev() {
            let Some(tag) = dom.tag(self.stack[index]) else {
                continue;
            };
            if targets.contains(&tag) {
                self.stack.truncate(index);
                return;
            }
            if boundaries.contains(&tag) {
                return;
            }
        }
    }

    fn close_element(&mut self, dom: &Dom, name: &str) {
        for index in (1..self.stack.len()).rev() {
            if dom.is_tag(self.stack[index], name) {
                self.stack.truncate(index);
                return;
            }
        }
    }
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == ':' || c == '_'
}

fn parse_end_tag(rest: &str) -> Option<(String, usize)> {
    let after = &rest[2..];
    if !after.starts_with(|c: char| c.is_ascii_alphabetic()) {
        return None;
    }
    let name_len = after.find(|c: char| !is_name_char(c)).unwrap_or(after.len());
    let name = after[..name_len].to_ascii_lowercase();
    let close = after.find('>')?;
    Some((name, 2 + close + 1))
}

fn parse_start_tag(rest: &str) -> Option<(StartTag, usize)> {
    let bytes = rest.as_bytes();
    let mut pos = 1;
    while pos < bytes.len() && is_name_char(bytes[pos] as char) {
        pos += 1;
    }
    let name = rest[1..pos].to_ascii_lowercase();
    let mut attrs = Vec::new();
    let mut self_closing = false;

    loop {
        while pos < bytes.len() && bytes[pos].is_ascii_whitespace() {
            pos += 1;
        }
        if pos >= bytes.len() {
            return None;
        }
        match bytes[pos] {
            b'>' => {
                pos += 1;
                break;
            }
            b'/' if bytes.get(pos + 1) == Some(&b'>') => {
                self_closing = true;
                pos += 2;
                break;
            }
            b'/' => {
                pos += 1;
                continue;
            }
            _ => {}
        }

        let name_start = pos;
        while pos < bytes.len()
            && !bytes[pos].is_ascii_whitespace()
            && !matches!(bytes[pos], b'=' | b'>')
            && !(bytes[pos] == b'/' && bytes.get(pos + 1) == Some(&b'>'))
        {
            pos += 1;
        }
        let attr_name = rest[name_start..pos].to_ascii_lowercase();

        let mut probe = pos;
        while probe < bytes.len() && bytes[probe].is_ascii_whitespace() {
            probe += 1;
        }
        if probe < bytes.len() && bytes[probe] == b'=' {
            pos = probe + 1;
            while pos < bytes.len() && bytes[pos].is_ascii_whitespace() {
                pos += 1;
            }
            if pos >= bytes.len() {
                return None;
            }
            let value = match bytes[pos] {
                quote @ (b'"' | b'\'') => {
                    let value_start = pos + 1;
                    let value_len = rest[value_start..].find(quote as char)?;
                    pos = value_start + value_len + 1;
                    &rest[value_start..value_start + value_len]
                }
                _ => {
                    let value_start = pos;
                    while pos < bytes.len()
                        && !bytes[pos].is_ascii_whitespace()
                        && bytes[pos] != b'>'
                    {
                        pos += 1;
                    }
                    &rest[value_start..pos]
                }
            };
            if !attr_name.is_empty() {
                attrs.push((attr_name, value.to_string()));
            }
        } else if !attr_name.is_empty() {
            attrs.push((attr_name, String::new()));
        }
    }

    Some((
        StartTag {
            name,
            attrs,
            self_closing,
        },
        pos,
    ))
}
