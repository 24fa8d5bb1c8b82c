use crate::heap::Heap;
use crate::symbol::{sym, SymbolTable};
use crate::value::Value;

/// Nesting beyond this prints as `...`; cyclic structures stop here.
const MAX_PRINT_DEPTH: usize = 1000;

/// Render a value in re-readable form.
pub fn print_val(val: Value, heap: &Heap, symbols: &SymbolTable) -> String {
    let mut out = String::new();
    print_inner(val, heap, symbols, &mut out, 0);
    out
}

/// Render a value for humans: a string shows its text, anything else prints
/// as with `print_val`.
pub fn display_val(val: Value, heap: &Heap, symbols: &SymbolTable) -> String {
    match val {
        Value::Str(id) => heap.string(id).to_string(),
        other => print_val(other, heap, symbols),
    }
}

fn print_inner(val: Value, heap: &Heap, symbols: &SymbolTable, out: &mut String, depth: usize) {
    if depth > MAX_PRINT_DEPTH {
        out.push_str("...");
        return;
    }

    match val {
        Value::Nil => out.push_str("nil"),
        Value::Bool(true) => out.push_str("#t"),
        Value::Bool(false) => out.push_str("#f"),
        Value::Int(n) => out.push_str(&n.to_string()),
        Value::Real(x) => out.push_str(&format_real(x)),
        Value::Symbol(id) => out.push_str(symbols.name(id)),
        Value::Str(id) => print_string(heap.string(id), out),
        Value::Primitive(p) => {
            out.push_str("#<primitive ");
            out.push_str(p.name());
            out.push('>');
        }
        Value::Closure(id) => match heap.closure(id).name {
            Some(name) => {
                out.push_str("#<lambda ");
                out.push_str(symbols.name(name));
                out.push('>');
            }
            None => out.push_str("#<lambda>"),
        },
        Value::Pair(id) => {
            // (quote x) -> 'x
            let car = heap.car(id);
            let cdr = heap.cdr(id);
            if car == Value::Symbol(sym::QUOTE) {
                if let Value::Pair(rest) = cdr {
                    if heap.cdr(rest).is_nil() {
                        out.push('\'');
                        print_inner(heap.car(rest), heap, symbols, out, depth + 1);
                        return;
                    }
                }
            }

            out.push('(');
            print_inner(car, heap, symbols, out, depth + 1);

            let mut current = cdr;
            let mut printed = 1;
            loop {
                match current {
                    Value::Nil => break,
                    Value::Pair(next) => {
                        if printed > MAX_PRINT_DEPTH {
                            out.push_str(" ...");
                            break;
                        }
                        out.push(' ');
                        print_inner(heap.car(next), heap, symbols, out, depth + 1);
                        current = heap.cdr(next);
                        printed += 1;
                    }
                    tail => {
                        out.push_str(" . ");
                        print_inner(tail, heap, symbols, out, depth + 1);
                        break;
                    }
                }
            }
            out.push(')');
        }
    }
}

/// Shortest round-trip form, always with a decimal point or exponent.
fn format_real(x: f64) -> String {
    if x.is_nan() {
        "+nan".to_string()
    } else if x.is_infinite() {
        if x > 0.0 { "+inf".to_string() } else { "-inf".to_string() }
    } else {
        format!("{:?}", x)
    }
}

fn print_string(text: &str, out: &mut String) {
    out.push('"');
    for ch in text.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            c => out.push(c),
        }
    }
    out.push('"');
}
