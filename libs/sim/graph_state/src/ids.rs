// This file is part of HeroineGraph.
//
// HeroineGraph is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// HeroineGraph is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with HeroineGraph.  If not, see <http://www.gnu.org/licenses/>.
use std::fmt;

/// Densely-indexed internal node identifier. Stable for the lifetime of the
/// node; the only index GPU buffers and CSR arrays ever see.
pub type NodeSlot = u32;

/// Internal edge index. Unstable across removals: swap-remove moves the
/// highest live edge into the vacated index.
pub type EdgeSlot = u32;

/// External identifier supplied by the embedder; text or integer.
#[derive(Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub enum GraphId {
    Text(String),
    Int(u64),
}

impl fmt::Display for GraphId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Text(s) => write!(f, "{}", s),
            Self::Int(n) => write!(f, "{}", n),
        }
    }
}

impl From<&str> for GraphId {
    fn from(s: &str) -> Self {
        Self::Text(s.to_owned())
    }
}

impl From<String> for GraphId {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<u64> for GraphId {
    fn from(n: u64) -> Self {
        Self::Int(n)
    }
}

impl From<u32> for GraphId {
    fn from(n: u32) -> Self {
        Self::Int(n as u64)
    }
}

impl From<usize> for GraphId {
    fn from(n: usize) -> Self {
        Self::Int(n as u64)
    }
}

/// Opaque token carried alongside a node or edge. The engine never reads
/// into it; the embedder resolves it to whatever payload it stands for.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct MetadataToken(pub u64);
