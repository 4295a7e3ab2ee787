//! Render engine
//!
//! Every template-bearing entry goes through the same steps:
//!
//! 1. lex the part into lossless XML pieces
//! 2. concatenate the character data of its text elements and scan it for
//!    tokens, so a token may straddle several runs
//! 3. cut each token out of the text nodes it touches, leaving a single
//!    placeholder where it starts
//! 4. pair repeat-scope tags into loop nodes
//! 5. emit the part, resolving placeholders against the data tree
//!
//! Tag failures never stop the pass. They are collected for the whole
//! archive and reported together; nothing is committed unless there are none.

use std::borrow::Cow;
use std::cmp::Reverse;
use std::collections::HashMap;

use serde_json::Value;
use tracing::debug;

use crate::archive::{Archive, Entry, MAIN_DOCUMENT_PART};
use crate::error::{DocgenError, RenderErrorEntry, RenderErrors, ScanError, TagError};
use crate::scanner::{Delimiters, Scanner, Token};
use crate::tag::{NullPolicy, ResolvedValue, Resolver, Scopes, Tag};
use crate::transform::DataTree;
use crate::xml::{self, Grammar, Piece};

/// Render configuration, fixed for one render call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderOptions {
    /// Repeat whole paragraphs when loop tags sit alone in their paragraphs
    pub paragraph_loop: bool,
    /// Turn `\n` in values into line-break markup
    pub linebreaks: bool,
    pub delimiters: Delimiters,
    pub null_policy: NullPolicy,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            paragraph_loop: true,
            linebreaks: true,
            delimiters: Delimiters::default(),
            null_policy: NullPolicy::EmptyString,
        }
    }
}

/// Tokens found in one template-bearing entry
#[derive(Debug, Clone)]
pub struct PartTokens {
    pub entry: String,
    pub tokens: Vec<Token>,
    /// Scan errors; offsets are relative to the scanned text
    pub errors: Vec<RenderErrorEntry>,
}

/// Substitutes data into the template-bearing entries of an archive
#[derive(Debug, Clone)]
pub struct Renderer {
    options: RenderOptions,
    scanner: Scanner,
    resolver: Resolver,
}

impl Renderer {
    pub fn new(options: RenderOptions) -> Self {
        // Character data is scanned in its escaped form.
        let scanner = Scanner::new(options.delimiters.xml_escaped());
        let resolver = Resolver::new(options.null_policy);
        Self { options, scanner, resolver }
    }

    pub fn options(&self) -> &RenderOptions {
        &self.options
    }

    /// Render every template-bearing entry, returning a new archive.
    ///
    /// The input archive is left untouched. Entries without tokens are
    /// carried over byte for byte.
    pub fn render(&self, archive: &Archive, tree: &DataTree) -> Result<Archive, DocgenError> {
        archive.read_entry(MAIN_DOCUMENT_PART)?;

        let root = Value::Object(tree.clone());
        let mut errors = Vec::new();
        let mut rendered = Vec::new();

        for entry in archive.entries() {
            let Some(grammar) = xml::grammar_for(&entry.name) else {
                continue;
            };
            let source = part_source(entry)?;

            let parsed = Part::parse(&entry.name, source, grammar, &self.scanner, &mut errors)?;
            let Some(part) = parsed else {
                continue;
            };
            let nodes = part.structure(self.options.paragraph_loop, &mut errors);

            let mut out = String::with_capacity(source.len());
            let mut scopes = Scopes::new(&root);
            self.emit(&part, &nodes, &mut scopes, &mut out, &mut errors);

            debug!(entry = %entry.name, tokens = part.tokens.len(), "rendered part");
            rendered.push((entry.name.as_str(), out));
        }

        if let Some(errors) = RenderErrors::new(errors) {
            return Err(DocgenError::RenderFailed(errors));
        }

        let mut output = archive.clone();
        for (name, content) in rendered {
            output.write_entry(name, content)?;
        }
        Ok(output)
    }

    /// Scan every template-bearing entry without resolving anything
    pub fn inspect(&self, archive: &Archive) -> Result<Vec<PartTokens>, DocgenError> {
        let mut parts = Vec::new();
        for entry in archive.entries() {
            let Some(grammar) = xml::grammar_for(&entry.name) else {
                continue;
            };
            let source = part_source(entry)?;
            let mut errors = Vec::new();
            let part = Part::parse(&entry.name, source, grammar, &self.scanner, &mut errors)?;
            parts.push(PartTokens {
                entry: entry.name.clone(),
                tokens: part.map(|p| p.tokens).unwrap_or_default(),
                errors,
            });
        }
        Ok(parts)
    }

    fn emit(
        &self,
        part: &Part<'_>,
        nodes: &[Node],
        scopes: &mut Scopes<'_>,
        out: &mut String,
        errors: &mut Vec<RenderErrorEntry>,
    ) {
        for node in nodes {
            match node {
                Node::Item(index) => match &part.items[*index] {
                    Item::Placeholder(id) => self.emit_placeholder(part, *id, scopes, out, errors),
                    item => out.push_str(item.raw()),
                },
                Node::Loop { token, children } => {
                    let Tag::LoopOpen(path) = &part.tokens[*token].tag else {
                        continue;
                    };
                    match self.resolver.resolve_sequence(path, scopes) {
                        Ok(elements) => {
                            for element in elements {
                                scopes.push(element);
                                self.emit(part, children, scopes, out, errors);
                                scopes.pop();
                            }
                        }
                        Err(e) => part.record(errors, *token, e.into()),
                    }
                }
            }
        }
    }

    fn emit_placeholder(
        &self,
        part: &Part<'_>,
        id: usize,
        scopes: &Scopes<'_>,
        out: &mut String,
        errors: &mut Vec<RenderErrorEntry>,
    ) {
        let token = &part.tokens[id];
        let resolved = match &token.tag {
            Tag::FieldLookup(path) => self.resolver.resolve_field(path, scopes),
            Tag::RawMarkup(name) => self.resolver.resolve_markup(name, scopes),
            // Paired loop tags never reach here; unpaired ones are already reported.
            Tag::LoopOpen(_) | Tag::LoopClose(_) => return,
        };

        let context = part.contexts.get(&id);
        match resolved {
            Ok(ResolvedValue::Text(text)) => self.push_text(part.grammar, context, &text, out),
            Ok(ResolvedValue::Markup(markup)) => push_markup(context, &markup, out),
            Ok(ResolvedValue::Omitted) => out.push_str(&token.raw),
            Err(e) => part.record(errors, id, e.into()),
        }
    }

    fn push_text(
        &self,
        grammar: &Grammar,
        context: Option<&Context<'_>>,
        text: &str,
        out: &mut String,
    ) {
        let text_element = context.and_then(|c| c.text.as_ref());
        match (self.options.linebreaks, grammar.line_break, text_element) {
            (true, Some(line_break), Some(element)) => {
                for (i, line) in text.split('\n').enumerate() {
                    if i > 0 {
                        out.push_str("</");
                        out.push_str(element.name);
                        out.push('>');
                        out.push_str(line_break);
                        out.push_str(&element.open);
                    }
                    let line = line.strip_suffix('\r').unwrap_or(line);
                    out.push_str(&quick_xml::escape::escape(line));
                }
            }
            _ => out.push_str(&quick_xml::escape::escape(text)),
        }
    }
}

/// Insert markup verbatim, splitting the enclosing run around it
fn push_markup(context: Option<&Context<'_>>, markup: &str, out: &mut String) {
    if markup.is_empty() {
        return;
    }
    let split = context.and_then(|c| Some((c.text.as_ref()?, c.run.as_ref()?)));
    match split {
        Some((text, run)) => {
            out.push_str("</");
            out.push_str(text.name);
            out.push_str("></");
            out.push_str(run.name);
            out.push('>');
            out.push_str(markup);
            out.push_str(&run.reopen);
            out.push_str(&text.open);
        }
        None => out.push_str(markup),
    }
}

/// Output unit of a part after tokens are cut out
#[derive(Debug, Clone)]
enum Item<'a> {
    Open { name: &'a str, raw: Cow<'a, str> },
    Close(&'a str),
    Markup(&'a str),
    Text { raw: &'a str, text_node: bool },
    Placeholder(usize),
}

impl Item<'_> {
    fn raw(&self) -> &str {
        match self {
            Item::Open { raw, .. } => &**raw,
            Item::Close(raw) | Item::Markup(raw) | Item::Text { raw, .. } => *raw,
            Item::Placeholder(_) => "",
        }
    }
}

/// Span of a token inside one text node
#[derive(Debug, Clone, Copy)]
struct Cut {
    from: usize,
    to: usize,
    /// Set on the node where the token starts
    token: Option<usize>,
}

/// Element range `start..=end` in the item list, at `depth` in the element stack
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Block {
    depth: usize,
    start: usize,
    end: usize,
}

#[derive(Debug, Clone)]
struct TextElement<'a> {
    name: &'a str,
    open: String,
}

#[derive(Debug, Clone)]
struct RunElement<'a> {
    name: &'a str,
    /// Start tag plus formatting, used to reopen the run after raw markup
    reopen: String,
}

/// Where a placeholder sits in the element tree
#[derive(Debug, Clone)]
struct Context<'a> {
    item: usize,
    path: Vec<&'a str>,
    paragraph: Option<Block>,
    text: Option<TextElement<'a>>,
    run: Option<RunElement<'a>>,
}

/// A repeat scope: `outer` is replaced, `inner` (exclusive end) is repeated
#[derive(Debug, Clone, Copy)]
struct Span {
    token: usize,
    outer: (usize, usize),
    inner: (usize, usize),
}

#[derive(Debug, Clone)]
enum Node {
    Item(usize),
    Loop { token: usize, children: Vec<Node> },
}

/// A template-bearing part with its tokens placed
struct Part<'a> {
    entry: &'a str,
    grammar: &'static Grammar,
    items: Vec<Item<'a>>,
    tokens: Vec<Token>,
    contexts: HashMap<usize, Context<'a>>,
}

impl<'a> Part<'a> {
    /// Lex and scan a part. Returns `None` when it holds no tokens.
    fn parse(
        entry: &'a str,
        source: &'a str,
        grammar: &'static Grammar,
        scanner: &Scanner,
        errors: &mut Vec<RenderErrorEntry>,
    ) -> Result<Option<Self>, DocgenError> {
        let pieces = xml::lex(source, grammar).map_err(|reason| DocgenError::MalformedXml {
            entry: entry.to_string(),
            reason,
        })?;

        let text_nodes: Vec<usize> = pieces
            .iter()
            .enumerate()
            .filter(|(_, p)| matches!(p, Piece::Text { text_node: true, .. }))
            .map(|(i, _)| i)
            .collect();
        let streams: Vec<Vec<usize>> = if grammar.single_stream {
            vec![text_nodes]
        } else {
            text_nodes.into_iter().map(|i| vec![i]).collect()
        };

        let mut tokens = Vec::new();
        let mut cuts: HashMap<usize, Vec<Cut>> = HashMap::new();

        for stream in &streams {
            let mut text = String::new();
            let mut offsets = Vec::with_capacity(stream.len());
            for &i in stream {
                offsets.push(text.len());
                text.push_str(pieces[i].raw());
            }

            let outcome = scanner.scan_lenient(&text);
            for err in outcome.errors {
                let offset = match err {
                    ScanError::UnterminatedToken { offset }
                    | ScanError::NestedToken { offset, .. } => offset,
                };
                errors.push(RenderErrorEntry {
                    entry: entry.to_string(),
                    tag: excerpt(&text[offset..]),
                    offset,
                    cause: TagError::Scan(err),
                });
            }

            for mut token in outcome.tokens {
                // Tag text was scanned in escaped form.
                let unescaped = match quick_xml::escape::unescape(&token.text) {
                    Ok(Cow::Owned(unescaped)) => Some(unescaped),
                    _ => None,
                };
                if let Some(unescaped) = unescaped {
                    token.tag = Tag::classify(&unescaped);
                    token.text = unescaped;
                }
                let id = tokens.len();
                let first = locate(&offsets, token.start);
                let last = locate(&offsets, token.end - 1);
                for k in first..=last {
                    let node_start = offsets[k];
                    let node_end = node_start + pieces[stream[k]].raw().len();
                    cuts.entry(stream[k]).or_default().push(Cut {
                        from: token.start.max(node_start) - node_start,
                        to: token.end.min(node_end) - node_start,
                        token: (k == first).then_some(id),
                    });
                }
                tokens.push(token);
            }
        }

        if tokens.is_empty() {
            return Ok(None);
        }

        let items = place_tokens(pieces, cuts, grammar);
        let contexts = placeholder_contexts(&items, grammar);
        Ok(Some(Self {
            entry,
            grammar,
            items,
            tokens,
            contexts,
        }))
    }

    fn record(&self, errors: &mut Vec<RenderErrorEntry>, id: usize, cause: TagError) {
        let token = &self.tokens[id];
        let entry = RenderErrorEntry {
            entry: self.entry.to_string(),
            tag: token.text.clone(),
            offset: token.start,
            cause,
        };
        // Tags inside repeat scopes fail once per element; report them once.
        if !errors.contains(&entry) {
            errors.push(entry);
        }
    }

    /// Pair loop tags and build the node tree
    fn structure(&self, paragraph_loop: bool, errors: &mut Vec<RenderErrorEntry>) -> Vec<Node> {
        let mut open: Vec<usize> = Vec::new();
        let mut pairs = Vec::new();

        for item in &self.items {
            let Item::Placeholder(id) = item else { continue };
            match &self.tokens[*id].tag {
                Tag::LoopOpen(_) => open.push(*id),
                Tag::LoopClose(path) => match open.pop() {
                    None => self.record(errors, *id, TagError::UnopenedLoop),
                    Some(o) => match &self.tokens[o].tag {
                        Tag::LoopOpen(expected) if expected != path => {
                            let expected = expected.to_string();
                            self.record(errors, *id, TagError::MismatchedLoop { expected });
                        }
                        _ => pairs.push((o, *id)),
                    },
                },
                Tag::FieldLookup(_) | Tag::RawMarkup(_) => {}
            }
        }
        for id in open {
            self.record(errors, id, TagError::UnclosedLoop);
        }

        let mut spans = Vec::with_capacity(pairs.len());
        for (o, c) in pairs {
            let (Some(open_ctx), Some(close_ctx)) = (self.contexts.get(&o), self.contexts.get(&c))
            else {
                continue;
            };
            match self.span(paragraph_loop, o, open_ctx, c, close_ctx) {
                Some(span) => spans.push(span),
                None => self.record(errors, o, TagError::UnbalancedLoop),
            }
        }

        // Spans must nest: each one lies within the repeated range of its parent.
        spans.sort_by_key(|s| (s.outer.0, Reverse(s.outer.1)));
        let mut parents: Vec<Span> = Vec::new();
        let mut by_start = HashMap::new();
        for span in spans {
            while parents.last().is_some_and(|p| p.outer.1 < span.outer.0) {
                parents.pop();
            }
            if let Some(parent) = parents.last() {
                if span.outer.0 < parent.inner.0 || span.outer.1 >= parent.inner.1 {
                    self.record(errors, span.token, TagError::UnbalancedLoop);
                    continue;
                }
            }
            parents.push(span);
            by_start.insert(span.outer.0, span);
        }

        build_nodes(0, self.items.len(), &by_start)
    }

    fn span(
        &self,
        paragraph_loop: bool,
        o: usize,
        open: &Context<'_>,
        c: usize,
        close: &Context<'_>,
    ) -> Option<Span> {
        if paragraph_loop {
            if let (Some(p1), Some(p2)) = (open.paragraph, close.paragraph) {
                if p1.end < p2.start && self.is_alone(p1, o) && self.is_alone(p2, c) {
                    return (open.path[..p1.depth] == close.path[..p2.depth]).then_some(Span {
                        token: o,
                        outer: (p1.start, p2.end),
                        inner: (p1.end + 1, p2.start),
                    });
                }
            }
        }
        (open.path == close.path).then_some(Span {
            token: o,
            outer: (open.item, close.item),
            inner: (open.item + 1, close.item),
        })
    }

    /// Whether `token` is the only text in `block`
    fn is_alone(&self, block: Block, token: usize) -> bool {
        self.items[block.start..=block.end].iter().all(|item| match item {
            Item::Placeholder(id) => *id == token,
            Item::Text { raw, text_node: true } => raw.trim().is_empty(),
            _ => true,
        })
    }
}

fn part_source(entry: &Entry) -> Result<&str, DocgenError> {
    std::str::from_utf8(&entry.data).map_err(|e| DocgenError::MalformedXml {
        entry: entry.name.clone(),
        reason: e.to_string(),
    })
}

fn build_nodes(lo: usize, hi: usize, spans: &HashMap<usize, Span>) -> Vec<Node> {
    let mut nodes = Vec::new();
    let mut k = lo;
    while k < hi {
        match spans.get(&k) {
            Some(span) => {
                nodes.push(Node::Loop {
                    token: span.token,
                    children: build_nodes(span.inner.0, span.inner.1, spans),
                });
                k = span.outer.1 + 1;
            }
            None => {
                nodes.push(Node::Item(k));
                k += 1;
            }
        }
    }
    nodes
}

/// Index of the text node containing byte `pos` of the stream
fn locate(offsets: &[usize], pos: usize) -> usize {
    offsets.partition_point(|&o| o <= pos).saturating_sub(1)
}

fn excerpt(text: &str) -> String {
    text.chars().take(24).collect()
}

/// Split text nodes at token boundaries, leaving one placeholder per token
fn place_tokens<'a>(
    pieces: Vec<Piece<'a>>,
    mut cuts: HashMap<usize, Vec<Cut>>,
    grammar: &Grammar,
) -> Vec<Item<'a>> {
    let mut items = Vec::with_capacity(pieces.len() + cuts.len() * 2);
    // Open tag of the innermost enclosing text element
    let mut text_open: Option<usize> = None;

    for (i, piece) in pieces.into_iter().enumerate() {
        match piece {
            Piece::Open { name, raw } => {
                if grammar.is_text_element(name) {
                    text_open = Some(items.len());
                }
                items.push(Item::Open { name, raw: Cow::Borrowed(raw) });
            }
            Piece::Close { name, raw } => {
                if grammar.is_text_element(name) {
                    text_open = None;
                }
                items.push(Item::Close(raw));
            }
            Piece::Other { raw } => items.push(Item::Markup(raw)),
            Piece::Text { raw, text_node } => {
                let Some(mut node_cuts) = cuts.remove(&i) else {
                    items.push(Item::Text { raw, text_node });
                    continue;
                };

                if let (true, Some(j)) = (grammar.preserve_space, text_open) {
                    if let Item::Open { raw: tag, .. } = &mut items[j] {
                        let updated = xml::preserve_space(tag).into_owned();
                        *tag = Cow::Owned(updated);
                    }
                }

                node_cuts.sort_by_key(|c| c.from);
                let mut pos = 0;
                for cut in node_cuts {
                    if cut.from > pos {
                        items.push(Item::Text { raw: &raw[pos..cut.from], text_node: true });
                    }
                    if let Some(id) = cut.token {
                        items.push(Item::Placeholder(id));
                    }
                    pos = cut.to;
                }
                if pos < raw.len() {
                    items.push(Item::Text { raw: &raw[pos..], text_node: true });
                }
            }
        }
    }

    items
}

/// Record the enclosing elements of every placeholder
fn placeholder_contexts<'a>(items: &[Item<'a>], grammar: &Grammar) -> HashMap<usize, Context<'a>> {
    let mut matching: HashMap<usize, usize> = HashMap::new();
    let mut stack: Vec<usize> = Vec::new();
    for (i, item) in items.iter().enumerate() {
        match item {
            Item::Open { .. } => stack.push(i),
            Item::Close(_) => {
                if let Some(open) = stack.pop() {
                    matching.insert(open, i);
                }
            }
            _ => {}
        }
    }

    let name_of = |i: usize| match &items[i] {
        Item::Open { name, .. } => *name,
        _ => "",
    };

    let mut contexts = HashMap::new();
    stack.clear();
    for (i, item) in items.iter().enumerate() {
        match item {
            Item::Open { .. } => stack.push(i),
            Item::Close(_) => {
                stack.pop();
            }
            Item::Placeholder(id) => {
                let path: Vec<&'a str> = stack.iter().map(|&j| name_of(j)).collect();

                let paragraph = grammar.paragraph.and_then(|p| {
                    let depth = path.iter().rposition(|n| *n == p)?;
                    let start = stack[depth];
                    let end = *matching.get(&start)?;
                    Some(Block { depth, start, end })
                });

                let text = stack
                    .iter()
                    .rev()
                    .find(|&&j| grammar.is_text_element(name_of(j)))
                    .map(|&j| TextElement {
                        name: name_of(j),
                        open: items[j].raw().to_string(),
                    });

                let run = grammar.run.and_then(|r| {
                    let &j = stack.iter().rev().find(|&&j| name_of(j) == r)?;
                    let mut reopen = items[j].raw().to_string();
                    if let Some(props) = grammar.run_properties {
                        if j + 1 < items.len() && name_of(j + 1) == props {
                            if let Some(&end) = matching.get(&(j + 1)) {
                                for item in &items[j + 1..=end] {
                                    reopen.push_str(item.raw());
                                }
                            }
                        }
                    }
                    Some(RunElement { name: r, reopen })
                });

                contexts.insert(
                    *id,
                    Context {
                        item: i,
                        path,
                        paragraph,
                        text,
                        run,
                    },
                );
            }
            _ => {}
        }
    }

    contexts
}
