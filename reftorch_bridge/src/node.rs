use std::fmt;

/// Engine-side symbol table index. The bridge never looks inside.
pub type SymbolId = u32;

/// One cell of the engine's view field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Node {
    Number(i64),
    Char(char),
    Func(SymbolId),
    Ident(SymbolId),
    Open,
    Close,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeTag {
    Number,
    Char,
    Func,
    Ident,
    Open,
    Close,
}

impl Node {
    pub fn tag(&self) -> NodeTag {
        match self {
            Node::Number(_) => NodeTag::Number,
            Node::Char(_) => NodeTag::Char,
            Node::Func(_) => NodeTag::Func,
            Node::Ident(_) => NodeTag::Ident,
            Node::Open => NodeTag::Open,
            Node::Close => NodeTag::Close,
        }
    }
}

impl fmt::Display for NodeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NodeTag::Number => "number",
            NodeTag::Char => "character",
            NodeTag::Func => "function",
            NodeTag::Ident => "identifier",
            NodeTag::Open => "opening bracket",
            NodeTag::Close => "closing bracket",
        };
        f.write_str(name)
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Node::Number(n) => write!(f, "{}", n),
            Node::Char(c) => write!(f, "'{}'", c.escape_default()),
            Node::Func(id) => write!(f, "&{}", id),
            Node::Ident(id) => write!(f, "#{}", id),
            Node::Open => f.write_str("("),
            Node::Close => f.write_str(")"),
        }
    }
}

/// Builds node sequences the way an engine would lay them out.
#[derive(Debug, Default, Clone)]
pub struct ExprBuilder {
    nodes: Vec<Node>,
}

impl ExprBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn num(mut self, n: i64) -> Self {
        self.nodes.push(Node::Number(n));
        self
    }

    pub fn chr(mut self, c: char) -> Self {
        self.nodes.push(Node::Char(c));
        self
    }

    pub fn text(mut self, s: &str) -> Self {
        self.nodes.extend(s.chars().map(Node::Char));
        self
    }

    pub fn func(mut self, id: SymbolId) -> Self {
        self.nodes.push(Node::Func(id));
        self
    }

    pub fn ident(mut self, id: SymbolId) -> Self {
        self.nodes.push(Node::Ident(id));
        self
    }

    pub fn open(mut self) -> Self {
        self.nodes.push(Node::Open);
        self
    }

    pub fn close(mut self) -> Self {
        self.nodes.push(Node::Close);
        self
    }

    /// `( n0 n1 ... )`
    pub fn list(mut self, items: &[i64]) -> Self {
        self.nodes.push(Node::Open);
        self.nodes.extend(items.iter().map(|&n| Node::Number(n)));
        self.nodes.push(Node::Close);
        self
    }

    pub fn build(self) -> Vec<Node> {
        self.nodes
    }
}

/// Renders nodes in Refal-like notation, mainly for logs.
pub fn render(nodes: &[Node]) -> String {
    nodes
        .iter()
        .map(|n| n.to_string())
        .collect::<Vec<_>>()
        .join(" ")
}
