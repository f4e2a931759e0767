//! Operand extraction. Works on a borrowed slice of the view field, so a
//! failure can never leave the expression half consumed.

use std::path::PathBuf;

use crate::catalogue::OperandKind;
use crate::error::{BridgeError, BridgeResult, Expected, Found};
use crate::fixed::{self, Scale};
use crate::handle::{Handle, HandleTable};
use crate::node::Node;

/// One decoded operand.
#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    Int(i64),
    Real(f64),
    OptInt(Option<i64>),
    Handle(Handle),
    IntList(Vec<i64>),
    RealList(Vec<f64>),
    HandleList(Vec<Handle>),
    Path(PathBuf),
}

/// Decoded operands in signature order, consumed front to back.
#[derive(Debug, Clone)]
pub struct Args {
    items: std::vec::IntoIter<Arg>,
    taken: usize,
}

macro_rules! take_as {
    ($fn_name:ident, $variant:ident, $ty:ty) => {
        pub fn $fn_name(&mut self) -> BridgeResult<$ty> {
            match self.next(stringify!($variant))? {
                Arg::$variant(v) => Ok(v),
                other => Err(self.mismatch(stringify!($variant), &other)),
            }
        }
    };
}

impl Args {
    pub fn new(items: Vec<Arg>) -> Self {
        Self {
            items: items.into_iter(),
            taken: 0,
        }
    }

    pub fn remaining(&self) -> usize {
        self.items.len()
    }

    fn next(&mut self, wanted: &str) -> BridgeResult<Arg> {
        let index = self.taken;
        self.taken += 1;
        self.items.next().ok_or_else(|| {
            BridgeError::NativeFault(format!("operand {} ({}) was not extracted", index, wanted))
        })
    }

    fn mismatch(&self, wanted: &str, got: &Arg) -> BridgeError {
        BridgeError::NativeFault(format!(
            "operand {} decoded as {:?}, wanted {}",
            self.taken - 1,
            got,
            wanted
        ))
    }

    take_as!(int, Int, i64);
    take_as!(real, Real, f64);
    take_as!(opt_int, OptInt, Option<i64>);
    take_as!(handle, Handle, Handle);
    take_as!(int_list, IntList, Vec<i64>);
    take_as!(real_list, RealList, Vec<f64>);
    take_as!(handle_list, HandleList, Vec<Handle>);
    take_as!(path, Path, PathBuf);
}

/// Walks `nodes` against `signature`. `base` is the absolute position of
/// `nodes[0]` in the view field and is only used for error reports.
pub fn extract<T>(
    nodes: &[Node],
    base: usize,
    signature: &[OperandKind],
    table: &HandleTable<T>,
) -> BridgeResult<Args> {
    let mut cursor = Cursor {
        nodes,
        base,
        pos: 0,
    };
    let mut args = Vec::with_capacity(signature.len());
    for &kind in signature {
        let arg = match kind {
            OperandKind::Int => Arg::Int(cursor.number(kind)?),
            OperandKind::Real(scale) => Arg::Real(fixed::decode(cursor.number(kind)?, scale)),
            OperandKind::OptInt => match cursor.peek() {
                None => Arg::OptInt(None),
                Some(_) => Arg::OptInt(Some(cursor.number(kind)?)),
            },
            OperandKind::Handle => Arg::Handle(live(table, cursor.number(kind)?)?),
            OperandKind::IntList => Arg::IntList(cursor.list(kind)?),
            OperandKind::RealList(scale) => Arg::RealList(decode_all(cursor.list(kind)?, scale)),
            OperandKind::HandleList => {
                let raw = cursor.list(kind)?;
                let handles = raw
                    .into_iter()
                    .map(|n| live(table, n))
                    .collect::<BridgeResult<Vec<_>>>()?;
                Arg::HandleList(handles)
            }
            OperandKind::Path => Arg::Path(cursor.path(kind)?),
        };
        args.push(arg);
    }
    cursor.finish()?;
    Ok(Args::new(args))
}

fn live<T>(table: &HandleTable<T>, raw: i64) -> BridgeResult<Handle> {
    let handle = Handle::from_raw(raw);
    if table.contains(handle) {
        Ok(handle)
    } else {
        Err(BridgeError::UnknownHandle(handle))
    }
}

fn decode_all(raw: Vec<i64>, scale: Scale) -> Vec<f64> {
    raw.into_iter().map(|n| fixed::decode(n, scale)).collect()
}

struct Cursor<'a> {
    nodes: &'a [Node],
    base: usize,
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn peek(&self) -> Option<Node> {
        self.nodes.get(self.pos).copied()
    }

    fn found(&self) -> Found {
        match self.peek() {
            Some(node) => Found::Tag(node.tag()),
            None => Found::End,
        }
    }

    fn mismatch(&self, expected: Expected) -> BridgeError {
        BridgeError::TypeMismatch {
            position: self.base + self.pos,
            expected,
            found: self.found(),
        }
    }

    fn number(&mut self, kind: OperandKind) -> BridgeResult<i64> {
        match self.peek() {
            Some(Node::Number(n)) => {
                self.pos += 1;
                Ok(n)
            }
            _ => Err(self.mismatch(Expected::Operand(kind))),
        }
    }

    fn list(&mut self, kind: OperandKind) -> BridgeResult<Vec<i64>> {
        if self.peek() != Some(Node::Open) {
            return Err(self.mismatch(Expected::Operand(kind)));
        }
        self.pos += 1;
        let mut items = Vec::new();
        loop {
            match self.peek() {
                Some(Node::Number(n)) => {
                    items.push(n);
                    self.pos += 1;
                }
                Some(Node::Close) => {
                    self.pos += 1;
                    return Ok(items);
                }
                Some(_) => return Err(self.mismatch(Expected::ListElement)),
                None => return Err(self.mismatch(Expected::CloseBracket)),
            }
        }
    }

    fn path(&mut self, kind: OperandKind) -> BridgeResult<PathBuf> {
        let mut text = String::new();
        while let Some(node) = self.peek() {
            match node {
                Node::Char(c) => {
                    text.push(c);
                    self.pos += 1;
                }
                _ => return Err(self.mismatch(Expected::Operand(kind))),
            }
        }
        if text.is_empty() {
            return Err(self.mismatch(Expected::Operand(kind)));
        }
        Ok(PathBuf::from(text))
    }

    fn finish(&self) -> BridgeResult<()> {
        if self.pos == self.nodes.len() {
            Ok(())
        } else {
            Err(self.mismatch(Expected::End))
        }
    }
}
