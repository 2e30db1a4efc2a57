//! # Embeddable calculator and scripting language
//!
//! Expressions are compiled into immutable node trees and evaluated against
//! a chain of variable frames. Evaluation never fails: anything that cannot
//! be calculated is either kept in symbolic form (e.g. `x+1` while `x` is
//! unbound) or turned into a fault node carrying a message.
//!
//! Numbers keep the most exact representation possible and move up only
//! when needed. The list of number types starting from the lowest:
//! * Integers (64 bits, overflow falls back to floats)
//! * Rationals: `1/3` stays `1/3`, `1/3+2/3` becomes integer `1`
//! * Floats, including `∞`, `-∞` and `undef`
//! * Complex numbers with integer, rational, or float parts: `2+3*ⅈ`
//!
//! Other values: booleans, characters `'c'`, strings `"text"`, arrays
//! `{1,2,3}`, and number sets `ℕ ℤ ℚ ℝ ℂ ℙ ℱ`.
//!
//! Operators (starting from lowest priority):
//! * `;` - evaluate both, yield the right one
//! * `→` - assignment: `3→x`, `x^2→f(x)`, `0→a[1]`
//! * `˄`, `˅` - logical AND and OR
//! * `=`, `≠`, `∈`, `∉`, `⊆`, `⊈` - equality and membership
//! * `<`, `>`, `≤`, `≥` - comparison
//! * `+`, `-`, `◦` - addition, subtraction, concatenation
//! * `*`, `/`, `%`, `⁕`, `•`, `✖` - multiplication, division, remainder,
//!   scalar, matrix, and cross products
//! * `^` and superscripts like `x²` - power
//! * `ᵗ` - transposition, `¬` - NOT
//! * `!` - factorial, `a[i]` - indexing
//!
//! Multi-line programs support `if(c)`/`else`/`endif`, `while(c)`/`endwhile`,
//! `for(init,cond,step)`/`endfor`, and `return(e)`:
//!
//! ```
//! use calcscript::{CalcState, Node};
//!
//! let mut state = CalcState::new();
//! assert_eq!(state.eval("1/3+1/6"), Ok(Node::from_ratio(num_rational::Rational64::new(1, 2))));
//! assert_eq!(state.eval("8 ∈ ℱ"), Ok(Node::Bool(true)));
//! let text = "0→i\nwhile(i<10)\ni+1→i\nendwhile\nreturn(i)";
//! assert_eq!(state.run_script(text), Ok(Node::Int(10)));
//! ```

pub mod errors;
pub mod eval;
pub mod funcs;
pub mod intern;
pub mod node;
pub mod parse;
pub mod program;
pub mod render;
pub mod stack;
pub mod state;
pub mod value;

pub use errors::{CompileError, CompileResult};
pub use eval::Controller;
pub use funcs::{register_program_function, unregister_program_function, Func};
pub use intern::{intern, Name};
pub use node::{BinaryOp, FaultKind, Node, NumberSet, UnaryOp};
pub use parse::compile;
pub use program::Script;
pub use render::Dialect;
pub use stack::{Changes, Observer, Scope, Stack, Variable};
pub use state::{eval, CalcState};
