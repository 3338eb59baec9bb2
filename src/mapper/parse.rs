//! Mapper XML parsing

use super::{Fragment, Mapper, Node, Statement};
use crate::error::{Error, Result};
use crate::metadata::Action;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

/// Open element on the parse stack
enum Frame {
    Fragment { id: String, nodes: Vec<Node> },
    Statement { id: String, action: Action, nodes: Vec<Node> },
    If { test: String, nodes: Vec<Node> },
    Where(Vec<Node>),
    Set(Vec<Node>),
    Include { refid: String },
}

impl Frame {
    fn nodes_mut(&mut self) -> Option<&mut Vec<Node>> {
        match self {
            Frame::Fragment { nodes, .. }
            | Frame::Statement { nodes, .. }
            | Frame::If { nodes, .. }
            | Frame::Where(nodes)
            | Frame::Set(nodes) => Some(nodes),
            Frame::Include { .. } => None,
        }
    }
}

struct MapperParser<'a> {
    reader: Reader<&'a [u8]>,
    mapper: Mapper,
    stack: Vec<Frame>,
    in_root: bool,
    /// Statement-level errors, keyed by the owning statement id
    rejected: Vec<(String, Error)>,
    /// Open elements left to skip after a rejection
    skip: usize,
}

/// Parse a mapper document, failing on the first malformed statement.
///
/// Includes are left unresolved; see [`Statement::resolve_includes`].
pub fn parse(xml: &str) -> Result<Mapper> {
    let (mapper, rejected) = parse_with_rejections(xml)?;
    match rejected.into_iter().next() {
        Some((_, error)) => Err(error),
        None => Ok(mapper),
    }
}

/// Parse a mapper document, skipping malformed statements.
///
/// Only well-formedness errors and stray top-level text fail the whole
/// document. Any other error drops the enclosing `<sql>` or statement
/// element and is returned alongside its id.
pub fn parse_with_rejections(xml: &str) -> Result<(Mapper, Vec<(String, Error)>)> {
    let parser = MapperParser {
        reader: Reader::from_str(xml),
        mapper: Mapper::default(),
        stack: Vec::new(),
        in_root: false,
        rejected: Vec::new(),
        skip: 0,
    };
    parser.run()
}

impl<'a> MapperParser<'a> {
    fn run(mut self) -> Result<(Mapper, Vec<(String, Error)>)> {
        let mut seen_root = false;

        loop {
            let event = self
                .reader
                .read_event()
                .map_err(|e| self.error(format!("malformed mapper XML: {}", e)))?;

            if self.skip > 0 {
                match event {
                    Event::Start(_) => self.skip += 1,
                    Event::End(_) => self.skip -= 1,
                    Event::Eof => break,
                    _ => {}
                }
                continue;
            }

            match event {
                Event::Start(e) => {
                    if !self.in_root {
                        self.open_root(&e, seen_root)?;
                        seen_root = true;
                    } else {
                        let owner = self.owner(Some(&e));
                        if let Err(error) = self.open(&e) {
                            self.reject(owner, error, 1);
                        }
                    }
                }
                Event::Empty(e) => {
                    if !self.in_root {
                        self.open_root(&e, seen_root)?;
                        seen_root = true;
                        self.in_root = false;
                    } else {
                        let owner = self.owner(Some(&e));
                        if let Err(error) = self.open(&e).and_then(|_| self.close()) {
                            self.reject(owner, error, 0);
                        }
                    }
                }
                Event::End(_) => {
                    if self.stack.is_empty() {
                        self.in_root = false;
                    } else {
                        let owner = self.owner(None);
                        if let Err(error) = self.close() {
                            self.reject(owner, error, 0);
                        }
                    }
                }
                Event::Text(t) => {
                    let text = t
                        .unescape()
                        .map_err(|e| self.error(format!("invalid text: {}", e)))?;
                    self.text(&text)?;
                }
                Event::CData(c) => {
                    let text = String::from_utf8(c.into_inner().into_owned())
                        .map_err(|e| self.error(format!("invalid CDATA: {}", e)))?;
                    self.text(&text)?;
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if !seen_root {
            return Err(Error::syntax("mapper document has no <mapper> root element"));
        }
        if self.skip > 0 || !self.stack.is_empty() {
            return Err(Error::syntax("mapper document ended inside an open element"));
        }

        Ok((self.mapper, self.rejected))
    }

    /// Id of the statement or fragment an event belongs to
    fn owner(&self, e: Option<&BytesStart>) -> String {
        match self.stack.first() {
            Some(Frame::Statement { id, .. }) | Some(Frame::Fragment { id, .. }) => {
                return id.clone()
            }
            _ => {}
        }
        match e {
            Some(e) => match self.attribute(e, "id") {
                Ok(Some(id)) if !id.is_empty() => id,
                _ => format!("<{}>", element_name(e)),
            },
            None => String::from("<mapper>"),
        }
    }

    /// Drop the open statement and skip to its closing tag.
    ///
    /// `unclosed` counts the element that failed to open, if its end tag
    /// is still ahead.
    fn reject(&mut self, owner: String, error: Error, unclosed: usize) {
        self.skip = self.stack.len() + unclosed;
        self.stack.clear();
        self.rejected.push((owner, error));
    }

    fn open_root(&mut self, e: &BytesStart, seen_root: bool) -> Result<()> {
        let name = element_name(e);
        if name != "mapper" || seen_root {
            return Err(self.error(format!("expected a single <mapper> root, found <{}>", name)));
        }
        self.mapper.namespace = self.attribute(e, "namespace")?.unwrap_or_default();
        self.in_root = true;
        Ok(())
    }

    fn open(&mut self, e: &BytesStart) -> Result<()> {
        let name = element_name(e);
        let top_level = self.stack.is_empty();

        let frame = match name.as_str() {
            "sql" if top_level => Frame::Fragment {
                id: self.required(e, "id")?,
                nodes: Vec::new(),
            },
            "select" | "insert" | "update" | "delete" if top_level => Frame::Statement {
                id: self.required(e, "id")?,
                action: Action::from_tag(&name).unwrap_or(Action::Select),
                nodes: Vec::new(),
            },
            "include" if !top_level => Frame::Include {
                refid: self.required(e, "refid")?,
            },
            "if" if !top_level => Frame::If {
                test: self.required(e, "test")?,
                nodes: Vec::new(),
            },
            "where" if !top_level => Frame::Where(Vec::new()),
            "set" if !top_level => Frame::Set(Vec::new()),
            _ => {
                let place = if top_level { "under <mapper>" } else { "inside a statement" };
                return Err(self.error(format!("unexpected element <{}> {}", name, place)));
            }
        };

        if let Frame::Include { .. } = frame {
            if matches!(self.stack.last(), Some(Frame::Fragment { .. })) {
                return Err(self.error("<include> is not allowed inside <sql> fragments"));
            }
        }

        self.stack.push(frame);
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        let frame = match self.stack.pop() {
            Some(frame) => frame,
            None => return Err(self.error("unbalanced closing tag")),
        };

        let node = match frame {
            Frame::Fragment { id, nodes } => {
                let text = nodes
                    .into_iter()
                    .map(|n| match n {
                        Node::Text(t) => Ok(t),
                        _ => Err(Error::syntax(format!(
                            "fragment '{}' may only contain text",
                            id
                        ))),
                    })
                    .collect::<Result<String>>()?;
                self.mapper.fragments.push(Fragment {
                    id,
                    text: text.trim().to_string(),
                });
                return Ok(());
            }
            Frame::Statement { id, action, nodes } => {
                self.mapper.statements.push(Statement { id, action, nodes });
                return Ok(());
            }
            Frame::Include { refid } => Node::Include { refid, text: None },
            Frame::If { test, nodes } => Node::If { test, body: nodes },
            Frame::Where(nodes) => Node::Where(nodes),
            Frame::Set(nodes) => Node::Set(nodes),
        };

        if let Some(nodes) = self.stack.last_mut().and_then(Frame::nodes_mut) {
            nodes.push(node);
            return Ok(());
        }
        Err(self.error("dynamic element outside of a statement"))
    }

    fn text(&mut self, text: &str) -> Result<()> {
        let blank = text.trim().is_empty();
        match self.stack.last() {
            None | Some(Frame::Include { .. }) if blank => return Ok(()),
            None => return Err(self.error("text outside of a statement")),
            Some(Frame::Include { .. }) => {
                let owner = self.owner(None);
                let error = self.error("<include> cannot contain text");
                self.reject(owner, error, 0);
                return Ok(());
            }
            Some(_) => {}
        }

        if let Some(nodes) = self.stack.last_mut().and_then(Frame::nodes_mut) {
            match nodes.last_mut() {
                Some(Node::Text(prev)) => prev.push_str(text),
                _ => nodes.push(Node::Text(text.to_string())),
            }
        }
        Ok(())
    }

    fn attribute(&self, e: &BytesStart, key: &str) -> Result<Option<String>> {
        for attr in e.attributes() {
            let attr = attr.map_err(|err| self.error(format!("invalid attribute: {}", err)))?;
            if attr.key.as_ref() == key.as_bytes() {
                let value = attr
                    .unescape_value()
                    .map_err(|err| self.error(format!("invalid attribute value: {}", err)))?;
                return Ok(Some(value.trim().to_string()));
            }
        }
        Ok(None)
    }

    fn required(&self, e: &BytesStart, key: &str) -> Result<String> {
        match self.attribute(e, key)? {
            Some(value) if !value.is_empty() => Ok(value),
            _ => Err(self.error(format!(
                "<{}> is missing the '{}' attribute",
                element_name(e),
                key
            ))),
        }
    }

    fn error(&self, message: impl Into<String>) -> Error {
        let pos = self.reader.buffer_position() as usize;
        Error::syntax_at(message, pos, pos)
    }
}

fn element_name(e: &BytesStart) -> String {
    String::from_utf8_lossy(e.name().as_ref()).into_owned()
}
