use crate::error::{YalError, YalResult};
use crate::eval::Interpreter;
use crate::heap::Heap;
use crate::printer::display_val;
use crate::reader;
use crate::value::Value;

/// Accepted argument counts for a primitive.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Arity {
    Exact(usize),
    AtLeast(usize),
    Between(usize, usize),
}

impl Arity {
    pub fn check(self, name: &str, got: usize) -> YalResult<()> {
        let (ok, expected) = match self {
            Arity::Exact(n) => (got == n, n.to_string()),
            Arity::AtLeast(n) => (got >= n, format!("at least {}", n)),
            Arity::Between(lo, hi) => (got >= lo && got <= hi, format!("{} to {}", lo, hi)),
        };
        if ok {
            Ok(())
        } else {
            Err(YalError::arity(name, expected, got))
        }
    }
}

macro_rules! primitives {
    ($($variant:ident => $name:literal, $arity:expr;)*) => {
        /// Built-in procedures. The discriminant doubles as the heap encoding.
        #[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
        pub enum Primitive {
            $($variant),*
        }

        impl Primitive {
            pub const ALL: &'static [Primitive] = &[$(Primitive::$variant),*];

            /// Name the primitive is bound to in the global environment.
            pub fn name(self) -> &'static str {
                match self {
                    $(Primitive::$variant => $name),*
                }
            }

            pub fn arity(self) -> Arity {
                match self {
                    $(Primitive::$variant => $arity),*
                }
            }
        }
    };
}

primitives! {
    Add => "+", Arity::AtLeast(0);
    Sub => "-", Arity::AtLeast(1);
    Mul => "*", Arity::AtLeast(0);
    Div => "/", Arity::AtLeast(1);
    NumEq => "=", Arity::AtLeast(1);
    Lt => "<", Arity::AtLeast(1);
    Gt => ">", Arity::AtLeast(1);
    Le => "<=", Arity::AtLeast(1);
    Ge => ">=", Arity::AtLeast(1);
    Sqrt => "sqrt", Arity::Exact(1);
    Floor => "floor", Arity::Exact(1);
    Ceil => "ceil", Arity::Exact(1);
    Pow => "pow", Arity::Exact(2);
    Exp => "exp", Arity::Exact(1);
    Log => "log", Arity::Exact(1);
    Sin => "sin", Arity::Exact(1);
    Cos => "cos", Arity::Exact(1);
    Cons => "cons", Arity::Exact(2);
    Car => "car", Arity::Exact(1);
    Cdr => "cdr", Arity::Exact(1);
    List => "list", Arity::AtLeast(0);
    Length => "length", Arity::Exact(1);
    Reverse => "reverse", Arity::Exact(1);
    Nth => "nth", Arity::Exact(2);
    First => "first", Arity::Exact(1);
    Second => "second", Arity::Exact(1);
    Third => "third", Arity::Exact(1);
    Range => "range", Arity::Between(1, 2);
    Append => "append", Arity::AtLeast(0);
    SetCar => "set-car!", Arity::Exact(2);
    SetCdr => "set-cdr!", Arity::Exact(2);
    IsNull => "null?", Arity::Exact(1);
    IsPair => "pair?", Arity::Exact(1);
    IsNumber => "number?", Arity::Exact(1);
    IsInteger => "integer?", Arity::Exact(1);
    IsSymbol => "symbol?", Arity::Exact(1);
    IsString => "string?", Arity::Exact(1);
    IsProcedure => "procedure?", Arity::Exact(1);
    Not => "not", Arity::Exact(1);
    Eq => "eq?", Arity::Exact(2);
    Equal => "equal?", Arity::Exact(2);
    StringAppend => "string-append", Arity::AtLeast(0);
    StringLength => "string-length", Arity::Exact(1);
    SymbolToString => "symbol->string", Arity::Exact(1);
    StringToSymbol => "string->symbol", Arity::Exact(1);
    Apply => "apply", Arity::AtLeast(2);
    Map => "map", Arity::AtLeast(2);
    Read => "read", Arity::Exact(1);
    Eval => "eval", Arity::Exact(1);
    HeapStats => "heap-stats", Arity::Exact(0);
    Print => "print", Arity::AtLeast(0);
    Write => "write", Arity::Exact(1);
    Newline => "newline", Arity::Exact(0);
    Error => "error", Arity::AtLeast(1);
}

impl Primitive {
    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Option<Primitive> {
        Primitive::ALL.get(code as usize).copied()
    }
}

/// Invoke a primitive on already-evaluated arguments.
pub fn call_primitive(interp: &mut Interpreter, prim: Primitive, args: &[Value]) -> YalResult<Value> {
    prim.arity().check(prim.name(), args.len())?;

    match prim {
        Primitive::Add => fold("+", args, Num::Int(0), add),
        Primitive::Mul => fold("*", args, Num::Int(1), mul),
        Primitive::Sub if args.len() == 1 => Ok(sub(Num::Int(0), to_num("-", args[0])?)?.into()),
        Primitive::Sub => fold("-", &args[1..], to_num("-", args[0])?, sub),
        Primitive::Div if args.len() == 1 => Ok(div(Num::Int(1), to_num("/", args[0])?)?.into()),
        Primitive::Div => fold("/", &args[1..], to_num("/", args[0])?, div),
        Primitive::NumEq => compare(prim, args, |o| o == std::cmp::Ordering::Equal),
        Primitive::Lt => compare(prim, args, |o| o == std::cmp::Ordering::Less),
        Primitive::Gt => compare(prim, args, |o| o == std::cmp::Ordering::Greater),
        Primitive::Le => compare(prim, args, |o| o != std::cmp::Ordering::Greater),
        Primitive::Ge => compare(prim, args, |o| o != std::cmp::Ordering::Less),
        Primitive::Sqrt => real_fn("sqrt", args[0], f64::sqrt),
        Primitive::Floor => round_fn("floor", args[0], f64::floor),
        Primitive::Ceil => round_fn("ceil", args[0], f64::ceil),
        Primitive::Pow => Ok(pow(to_num("pow", args[0])?, to_num("pow", args[1])?)?.into()),
        Primitive::Exp => real_fn("exp", args[0], f64::exp),
        Primitive::Log => real_fn("log", args[0], f64::ln),
        Primitive::Sin => real_fn("sin", args[0], f64::sin),
        Primitive::Cos => real_fn("cos", args[0], f64::cos),

        Primitive::Cons => Ok(Value::Pair(interp.heap.cons(args[0], args[1])?)),
        Primitive::Car => interp.heap.car_val(args[0]),
        Primitive::Cdr => interp.heap.cdr_val(args[0]),
        Primitive::List => interp.heap.list(args),
        Primitive::Length => prim_length(&interp.heap, args[0]),
        Primitive::Reverse => prim_reverse(&mut interp.heap, args[0]),
        Primitive::Nth => prim_nth(&interp.heap, args[0], args[1]),
        Primitive::First => interp.heap.car_val(args[0]),
        Primitive::Second => {
            let rest = interp.heap.cdr_val(args[0])?;
            interp.heap.car_val(rest)
        }
        Primitive::Third => {
            let rest = interp.heap.cdr_val(args[0])?;
            let rest = interp.heap.cdr_val(rest)?;
            interp.heap.car_val(rest)
        }
        Primitive::Range if args.len() == 1 => prim_range(&mut interp.heap, Value::Int(0), args[0]),
        Primitive::Range => prim_range(&mut interp.heap, args[0], args[1]),
        Primitive::Append => prim_append(&mut interp.heap, args),
        Primitive::SetCar => match args[0] {
            Value::Pair(id) => {
                interp.heap.set_car(id, args[1]);
                Ok(args[1])
            }
            other => Err(type_error("set-car!", "pair", other)),
        },
        Primitive::SetCdr => match args[0] {
            Value::Pair(id) => {
                interp.heap.set_cdr(id, args[1]);
                Ok(args[1])
            }
            other => Err(type_error("set-cdr!", "pair", other)),
        },

        Primitive::IsNull => Ok(Value::Bool(args[0].is_nil())),
        Primitive::IsPair => Ok(Value::Bool(args[0].is_pair())),
        Primitive::IsNumber => Ok(Value::Bool(matches!(args[0], Value::Int(_) | Value::Real(_)))),
        Primitive::IsInteger => Ok(Value::Bool(matches!(args[0], Value::Int(_)))),
        Primitive::IsSymbol => Ok(Value::Bool(matches!(args[0], Value::Symbol(_)))),
        Primitive::IsString => Ok(Value::Bool(matches!(args[0], Value::Str(_)))),
        Primitive::IsProcedure => Ok(Value::Bool(args[0].is_procedure())),
        Primitive::Not => Ok(Value::Bool(!args[0].is_truthy())),
        Primitive::Eq => Ok(Value::Bool(args[0] == args[1])),
        Primitive::Equal => Ok(Value::Bool(equal(&interp.heap, args[0], args[1], 0)?)),

        Primitive::StringAppend => {
            let mut text = String::new();
            for &arg in args {
                match arg {
                    Value::Str(id) => text.push_str(interp.heap.string(id)),
                    other => return Err(type_error("string-append", "string", other)),
                }
            }
            Ok(Value::Str(interp.heap.alloc_string(&text)?))
        }
        Primitive::StringLength => match args[0] {
            Value::Str(id) => Ok(Value::Int(interp.heap.string(id).chars().count() as i64)),
            other => Err(type_error("string-length", "string", other)),
        },
        Primitive::SymbolToString => match args[0] {
            Value::Symbol(id) => {
                let name = interp.symbols.name(id).to_string();
                Ok(Value::Str(interp.heap.alloc_string(&name)?))
            }
            other => Err(type_error("symbol->string", "symbol", other)),
        },
        Primitive::StringToSymbol => match args[0] {
            Value::Str(id) => {
                let name = interp.heap.string(id).to_string();
                Ok(Value::Symbol(interp.symbols.intern(&name)))
            }
            other => Err(type_error("string->symbol", "string", other)),
        },

        Primitive::Apply => {
            let (spread, fixed) = args[1..].split_last().ok_or_else(|| {
                YalError::Internal("apply called without an argument list".into())
            })?;
            let mut call_args = fixed.to_vec();
            let tail = interp
                .heap
                .list_to_vec(*spread)
                .ok_or_else(|| type_error("apply", "proper list", *spread))?;
            call_args.extend(tail);
            interp.apply(args[0], &call_args)
        }
        Primitive::Map => prim_map(interp, args[0], &args[1..]),
        Primitive::Read => match args[0] {
            Value::Str(id) => {
                let text = interp.heap.string(id).to_string();
                reader::read_str(&text, &mut interp.heap, &mut interp.symbols)
            }
            other => Err(type_error("read", "string", other)),
        },
        Primitive::Eval => {
            let global = interp.envs.global();
            interp.eval(args[0], global)
        }
        Primitive::HeapStats => {
            let stats = interp.heap.stats();
            interp.heap.list(&[
                Value::Int(stats.capacity as i64),
                Value::Int(stats.used_bytes as i64),
                Value::Int(stats.free_bytes as i64),
                Value::Int(stats.live_blocks as i64),
            ])
        }

        Primitive::Print => {
            let mut line = args
                .iter()
                .map(|&a| display_val(a, &interp.heap, &interp.symbols))
                .collect::<Vec<_>>()
                .join(" ");
            line.push('\n');
            interp.write_output(&line)?;
            Ok(Value::Nil)
        }
        Primitive::Write => {
            let text = interp.print(args[0]);
            interp.write_output(&text)?;
            Ok(args[0])
        }
        Primitive::Newline => {
            interp.write_output("\n")?;
            Ok(Value::Nil)
        }
        Primitive::Error => {
            let mut message = display_val(args[0], &interp.heap, &interp.symbols);
            for &irritant in &args[1..] {
                message.push(' ');
                message.push_str(&interp.print(irritant));
            }
            Err(YalError::Raised(message))
        }
    }
}

fn type_error(name: &str, expected: &str, got: Value) -> YalError {
    YalError::Type(format!("{}: expected {}, got {}", name, expected, got.type_name()))
}

// === Arithmetic ===

#[derive(Clone, Copy, Debug, PartialEq)]
enum Num {
    Int(i64),
    Real(f64),
}

impl Num {
    fn as_f64(self) -> f64 {
        match self {
            Num::Int(n) => n as f64,
            Num::Real(x) => x,
        }
    }
}

impl From<Num> for Value {
    fn from(n: Num) -> Value {
        match n {
            Num::Int(n) => Value::Int(n),
            Num::Real(x) => Value::Real(x),
        }
    }
}

fn to_num(name: &str, val: Value) -> YalResult<Num> {
    match val {
        Value::Int(n) => Ok(Num::Int(n)),
        Value::Real(x) => Ok(Num::Real(x)),
        other => Err(type_error(name, "number", other)),
    }
}

fn overflow(op: &str) -> YalError {
    YalError::Type(format!("{}: integer overflow", op))
}

fn add(a: Num, b: Num) -> YalResult<Num> {
    match (a, b) {
        (Num::Int(x), Num::Int(y)) => x.checked_add(y).map(Num::Int).ok_or_else(|| overflow("+")),
        _ => Ok(Num::Real(a.as_f64() + b.as_f64())),
    }
}

fn sub(a: Num, b: Num) -> YalResult<Num> {
    match (a, b) {
        (Num::Int(x), Num::Int(y)) => x.checked_sub(y).map(Num::Int).ok_or_else(|| overflow("-")),
        _ => Ok(Num::Real(a.as_f64() - b.as_f64())),
    }
}

fn mul(a: Num, b: Num) -> YalResult<Num> {
    match (a, b) {
        (Num::Int(x), Num::Int(y)) => x.checked_mul(y).map(Num::Int).ok_or_else(|| overflow("*")),
        _ => Ok(Num::Real(a.as_f64() * b.as_f64())),
    }
}

/// Exact integer quotients stay integers; anything else is real.
fn div(a: Num, b: Num) -> YalResult<Num> {
    if b.as_f64() == 0.0 {
        return Err(YalError::DivideByZero);
    }
    match (a, b) {
        (Num::Int(x), Num::Int(y)) => match x.checked_rem(y) {
            Some(0) => x.checked_div(y).map(Num::Int).ok_or_else(|| overflow("/")),
            Some(_) => Ok(Num::Real(x as f64 / y as f64)),
            None => Err(overflow("/")),
        },
        _ => Ok(Num::Real(a.as_f64() / b.as_f64())),
    }
}

/// Integer powers stay exact while the exponent is a non-negative integer.
fn pow(base: Num, exp: Num) -> YalResult<Num> {
    match (base, exp) {
        (Num::Int(b), Num::Int(e)) if e >= 0 => {
            let e = u32::try_from(e).map_err(|_| overflow("pow"))?;
            b.checked_pow(e).map(Num::Int).ok_or_else(|| overflow("pow"))
        }
        _ => Ok(Num::Real(base.as_f64().powf(exp.as_f64()))),
    }
}

fn real_fn(name: &str, val: Value, f: fn(f64) -> f64) -> YalResult<Value> {
    Ok(Value::Real(f(to_num(name, val)?.as_f64())))
}

/// Integers are already whole and come back unchanged.
fn round_fn(name: &str, val: Value, f: fn(f64) -> f64) -> YalResult<Value> {
    match to_num(name, val)? {
        Num::Int(n) => Ok(Value::Int(n)),
        Num::Real(x) => Ok(Value::Real(f(x))),
    }
}

fn fold(
    name: &str,
    args: &[Value],
    init: Num,
    op: fn(Num, Num) -> YalResult<Num>,
) -> YalResult<Value> {
    let mut acc = init;
    for &arg in args {
        acc = op(acc, to_num(name, arg)?)?;
    }
    Ok(acc.into())
}

fn compare(prim: Primitive, args: &[Value], accept: fn(std::cmp::Ordering) -> bool) -> YalResult<Value> {
    let nums = args
        .iter()
        .map(|&v| to_num(prim.name(), v))
        .collect::<YalResult<Vec<_>>>()?;
    for pair in nums.windows(2) {
        let ordering = match (pair[0], pair[1]) {
            (Num::Int(x), Num::Int(y)) => x.cmp(&y),
            (a, b) => match a.as_f64().partial_cmp(&b.as_f64()) {
                Some(o) => o,
                None => return Ok(Value::Bool(false)),
            },
        };
        if !accept(ordering) {
            return Ok(Value::Bool(false));
        }
    }
    Ok(Value::Bool(true))
}

// === Lists ===

fn proper_list(heap: &Heap, name: &str, val: Value) -> YalResult<Vec<Value>> {
    heap.list_to_vec(val)
        .ok_or_else(|| type_error(name, "proper list", val))
}

fn prim_length(heap: &Heap, list: Value) -> YalResult<Value> {
    let mut count = 0;
    let mut current = list;
    loop {
        match current {
            Value::Nil => return Ok(Value::Int(count)),
            Value::Pair(id) => {
                count += 1;
                current = heap.cdr(id);
            }
            _ => return Err(type_error("length", "proper list", list)),
        }
    }
}

fn prim_reverse(heap: &mut Heap, list: Value) -> YalResult<Value> {
    let mut items = proper_list(heap, "reverse", list)?;
    items.reverse();
    heap.list(&items)
}

/// (nth n list): zero-based; past the end is nil.
fn prim_nth(heap: &Heap, n: Value, list: Value) -> YalResult<Value> {
    let index = match n {
        Value::Int(i) if i >= 0 => i,
        other => return Err(type_error("nth", "non-negative integer", other)),
    };
    let mut current = list;
    for _ in 0..index {
        current = heap.cdr_val(current)?;
        if current.is_nil() {
            return Ok(Value::Nil);
        }
    }
    heap.car_val(current)
}

/// (range start end): the integers in `[start, end)`. `(range end)` starts at 0.
fn prim_range(heap: &mut Heap, start: Value, end: Value) -> YalResult<Value> {
    let (start, end) = match (start, end) {
        (Value::Int(s), Value::Int(e)) => (s, e),
        (Value::Int(_), other) | (other, _) => return Err(type_error("range", "integer", other)),
    };
    if start > end {
        return Err(YalError::Type(format!(
            "range: start {} is greater than end {}",
            start, end
        )));
    }
    let items: Vec<Value> = (start..end).map(Value::Int).collect();
    heap.list(&items)
}

/// Copies every list but the last, which becomes the shared tail.
fn prim_append(heap: &mut Heap, args: &[Value]) -> YalResult<Value> {
    let (&last, init) = match args.split_last() {
        Some(split) => split,
        None => return Ok(Value::Nil),
    };
    let mut items = Vec::new();
    for &list in init {
        items.extend(proper_list(heap, "append", list)?);
    }
    heap.list_with_tail(&items, last)
}

fn prim_map(interp: &mut Interpreter, f: Value, lists: &[Value]) -> YalResult<Value> {
    let columns = lists
        .iter()
        .map(|&l| proper_list(&interp.heap, "map", l))
        .collect::<YalResult<Vec<_>>>()?;
    let rows = columns.iter().map(Vec::len).min().unwrap_or(0);
    let mut results = Vec::with_capacity(rows);
    for i in 0..rows {
        let row: Vec<Value> = columns.iter().map(|c| c[i]).collect();
        results.push(interp.apply(f, &row)?);
    }
    interp.heap.list(&results)
}

const MAX_EQUAL_DEPTH: usize = 10_000;

/// Structural equality: pairs by contents, strings by text, atoms by value.
fn equal(heap: &Heap, a: Value, b: Value, depth: usize) -> YalResult<bool> {
    if depth > MAX_EQUAL_DEPTH {
        return Err(YalError::DepthExceeded(MAX_EQUAL_DEPTH));
    }
    let (mut a, mut b) = (a, b);
    loop {
        match (a, b) {
            (Value::Pair(x), Value::Pair(y)) => {
                if x == y {
                    return Ok(true);
                }
                if !equal(heap, heap.car(x), heap.car(y), depth + 1)? {
                    return Ok(false);
                }
                a = heap.cdr(x);
                b = heap.cdr(y);
            }
            (Value::Str(x), Value::Str(y)) => return Ok(heap.string(x) == heap.string(y)),
            _ => return Ok(a == b),
        }
    }
}
