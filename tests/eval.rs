use std::cell::RefCell;
use std::io::{self, Write};
use std::rc::Rc;

use yal::config::{DEFAULT_MAX_DEPTH, EVAL_STACK_SIZE};
use yal::error::SyntaxErrorKind;
use yal::{Config, Interpreter, YalError};

/// Collects everything the interpreter writes.
#[derive(Clone, Default)]
struct Captured(Rc<RefCell<Vec<u8>>>);

impl Captured {
    fn text(&self) -> String {
        String::from_utf8_lossy(&self.0.borrow()).into_owned()
    }
}

impl Write for Captured {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

macro_rules! yal_assert {
    (@impl $interp: expr, program:$input:expr, result:$result:expr $(,)?) => {
        let output = $interp.eval_to_string($input).map_err(|err| {
            println!("{}:{}: execution failed: {}", file!(), line!(), err);
            err
        })?;
        assert_eq!(
            output,
            $result,
            "\n{}:{}: program: {}\n",
            file!(),
            line!(),
            $input
        );
    };
    (@impl $interp: expr, program:$input:expr, error:$desc:expr $(,)?) => {
        let output = $interp.eval_to_string($input);
        assert!(output.is_err(), "{}:{}: expected an error from {}", file!(), line!(), $input);
        assert_eq!(output.unwrap_err().to_string(), $desc);
    };
    (@impl $interp: expr, program:$input:expr, matches:$pat:pat $(,)?) => {
        let output = $interp.eval_to_string($input);
        assert!(
            matches!(output, Err($pat)),
            "\n{}:{}: program: {}\n  output: {:?}\n",
            file!(),
            line!(),
            $input,
            output
        );
    };
    (interp: $interp: expr, program: $($tail:tt)+) => {
        yal_assert!(@impl $interp, program: $($tail)+)
    };
    (program: $($tail:tt)+) => {
        let mut interp = Interpreter::new();
        yal_assert!(interp: interp, program: $($tail)+)
    };
}

#[test]
fn test_basic_evaluation() -> Result<(), YalError> {
    yal_assert! { program: "(+ 1 2)", result: "3" }
    yal_assert! { program: "(if #t 1 2)", result: "1" }
    yal_assert! { program: "((lambda (x) (+ x 1)) 5)", result: "6" }
    yal_assert! { program: "y", error: "unbound symbol 'y'" }
    yal_assert! { program: "42", result: "42" }
    yal_assert! { program: "\"hi\"", result: "\"hi\"" }
    yal_assert! { program: "", result: "nil" }
    Ok(())
}

#[test]
fn test_closures() -> Result<(), YalError> {
    yal_assert! { program: r##"
        (define (make-adder n) (lambda (x) (+ x n)))
        (define add5 (make-adder 5))
        (add5 10)
    "##, result: "15" }

    // Free variables resolve where the procedure was written, not where it is called.
    yal_assert! { program: r##"
        (define n 100)
        (define (get-n) n)
        (define (f n) (get-n))
        (f 1)
    "##, result: "100" }

    yal_assert! { program: r##"
        (define (make-counter)
          (let ((count 0))
            (lambda () (set! count (+ count 1)) count)))
        (define c (make-counter))
        (c) (c)
        (c)
    "##, result: "3" }

    yal_assert! { program: r##"
        (define (compose f g) (lambda (x) (f (g x))))
        ((compose car cdr) '(1 2 3))
    "##, result: "2" }

    yal_assert! { program: r##"
        (define (fact n) (if (= n 0) 1 (* n (fact (- n 1)))))
        (fact 10)
    "##, result: "3628800" }

    yal_assert! { program: r##"
        (define (fib n) (if (< n 2) n (+ (fib (- n 1)) (fib (- n 2)))))
        (fib 15)
    "##, result: "610" }
    Ok(())
}

#[test]
fn test_define() -> Result<(), YalError> {
    yal_assert! { program: "(define x 1)", result: "x" }
    yal_assert! { program: "(define x 1) (define x 2) x", result: "2" }
    yal_assert! { program: "(define (f a . b) (list a b)) (f 1 2 3)", result: "(1 (2 3))" }
    yal_assert! { program: "((lambda (x) (define y 2) (* x y)) 4)", result: "8" }
    yal_assert! { program: "((lambda (x) (define y 2) (* x y)) 4) y", error: "unbound symbol 'y'" }
    yal_assert! { program: "(define)", error: "malformed define" }
    yal_assert! { program: "(define 5 1)", error: "malformed define" }
    Ok(())
}

#[test]
fn test_special_forms() -> Result<(), YalError> {
    yal_assert! { program: "(if #f 1)", result: "nil" }
    yal_assert! { program: "(if nil 1 2)", result: "2" }
    yal_assert! { program: "(if 0 1 2)", result: "1" }
    yal_assert! { program: "(if '() 1 2)", result: "2" }
    yal_assert! { program: "(if)", error: "malformed if" }

    yal_assert! { program: "(quote (a b))", result: "(a b)" }
    yal_assert! { program: "'(1 . 2)", result: "(1 . 2)" }

    yal_assert! { program: "(let ((x 2) (y 3)) (* x y))", result: "6" }
    yal_assert! { program: "(define x 1) (let ((x 2)) x)", result: "2" }
    yal_assert! { program: "(define x 1) (let ((x 2)) x) x", result: "1" }
    yal_assert! { program: "(define x 1) (let ((x 2) (y x)) y)", result: "1" }
    yal_assert! { program: "(let () 7)", result: "7" }

    yal_assert! { program: "(begin 1 2 3)", result: "3" }
    yal_assert! { program: "(begin)", result: "nil" }

    yal_assert! { program: "(define x 1) (set! x 5) x", result: "5" }
    yal_assert! { program: "(set! undefined-var 1)", error: "unbound symbol 'undefined-var'" }

    yal_assert! { program: "(cond (#f 1) ((= 1 1) 2) (else 3))", result: "2" }
    yal_assert! { program: "(cond (#f 1) (else 3))", result: "3" }
    yal_assert! { program: "(cond (#f 1))", result: "nil" }
    yal_assert! { program: "(cond (42))", result: "42" }

    yal_assert! { program: "(and)", result: "#t" }
    yal_assert! { program: "(and 1 2 3)", result: "3" }
    yal_assert! { program: "(and 1 #f 3)", result: "#f" }
    yal_assert! { program: "(and #f (undefined))", result: "#f" }
    yal_assert! { program: "(or)", result: "#f" }
    yal_assert! { program: "(or #f 2)", result: "2" }
    yal_assert! { program: "(or #f nil)", result: "nil" }
    yal_assert! { program: "(or 1 (undefined))", result: "1" }
    Ok(())
}

#[test]
fn test_parameters_and_arity() -> Result<(), YalError> {
    yal_assert! { program: "((lambda (a . rest) rest) 1 2 3)", result: "(2 3)" }
    yal_assert! { program: "((lambda args args) 1 2)", result: "(1 2)" }
    yal_assert! { program: "((lambda args args))", result: "nil" }

    yal_assert! { program: "((lambda (x y) x) 1)", error: "lambda: expected 2 argument(s), got 1" }
    yal_assert! { program: "(define (f x) x) (f)", error: "f: expected 1 argument(s), got 0" }
    yal_assert! { program: "(define (f x) x) (f 1 2)", error: "f: expected 1 argument(s), got 2" }
    yal_assert! {
        program: "(define (g a . r) a) (g)",
        error: "g: expected at least 1 argument(s), got 0"
    }
    yal_assert! { program: "(cons 1)", error: "cons: expected 2 argument(s), got 1" }

    yal_assert! { program: "(5 1)", error: "not callable: 5" }
    yal_assert! { program: "('(1 2))", error: "not callable: (1 2)" }
    Ok(())
}

#[test]
fn test_arithmetic() -> Result<(), YalError> {
    yal_assert! { program: "(+)", result: "0" }
    yal_assert! { program: "(*)", result: "1" }
    yal_assert! { program: "(- 5)", result: "-5" }
    yal_assert! { program: "(- 10 3 2)", result: "5" }
    yal_assert! { program: "(* 2 3 4)", result: "24" }
    yal_assert! { program: "(/ 10 2)", result: "5" }
    yal_assert! { program: "(/ 7 2)", result: "3.5" }
    yal_assert! { program: "(/ 2)", result: "0.5" }
    yal_assert! { program: "(+ 1 2.5)", result: "3.5" }
    yal_assert! { program: "(* 1.5 2)", result: "3.0" }
    yal_assert! { program: "(- '(1 2) 1)", matches: YalError::Type(_) }
    yal_assert! { program: "(/ 1 0)", matches: YalError::DivideByZero }
    yal_assert! { program: "(/ 1.5 0.0)", matches: YalError::DivideByZero }
    yal_assert! { program: "(+ 1 'a)", error: "type error: +: expected number, got symbol" }
    yal_assert! { program: "(* 9223372036854775807 2)", matches: YalError::Type(_) }

    yal_assert! { program: "(< 1 2 3)", result: "#t" }
    yal_assert! { program: "(< 1 3 2)", result: "#f" }
    yal_assert! { program: "(= 1 1.0)", result: "#t" }
    yal_assert! { program: "(= 2 2 3)", result: "#f" }
    yal_assert! { program: "(>= 3 3 2)", result: "#t" }
    yal_assert! { program: "(<= 1 1 0)", result: "#f" }
    yal_assert! { program: "(> 2.5 2)", result: "#t" }

    yal_assert! { program: "PI", result: "3.141592653589793" }
    yal_assert! { program: "E", result: "2.718281828459045" }
    Ok(())
}

#[test]
fn test_lists() -> Result<(), YalError> {
    yal_assert! { program: "(cons 1 2)", result: "(1 . 2)" }
    yal_assert! { program: "(cons 1 '(2 3))", result: "(1 2 3)" }
    yal_assert! { program: "(car '(1 2))", result: "1" }
    yal_assert! { program: "(cdr '(1 2))", result: "(2)" }
    yal_assert! { program: "(car nil)", result: "nil" }
    yal_assert! { program: "(car 1)", matches: YalError::Type(_) }
    yal_assert! { program: "(list)", result: "nil" }
    yal_assert! { program: "(list 1 (list 2 3) \"s\")", result: "(1 (2 3) \"s\")" }
    yal_assert! { program: "(length '(1 2 3))", result: "3" }
    yal_assert! { program: "(length nil)", result: "0" }
    yal_assert! { program: "(length '(1 . 2))", matches: YalError::Type(_) }
    yal_assert! { program: "(reverse '(1 2 3))", result: "(3 2 1)" }
    yal_assert! { program: "(nth 1 '(a b c))", result: "b" }
    yal_assert! { program: "(nth 5 '(a b c))", result: "nil" }
    yal_assert! { program: "(nth -1 '(a b c))", matches: YalError::Type(_) }
    yal_assert! { program: "(first '(1 2 3))", result: "1" }
    yal_assert! { program: "(second '(1 2 3))", result: "2" }
    yal_assert! { program: "(third '(1 2 3))", result: "3" }
    yal_assert! { program: "(third '(1 2))", result: "nil" }
    yal_assert! { program: "(range 2 5)", result: "(2 3 4)" }
    yal_assert! { program: "(range (+ -1 2) 4)", result: "(1 2 3)" }
    yal_assert! { program: "(range 3)", result: "(0 1 2)" }
    yal_assert! { program: "(range 3 3)", result: "nil" }
    yal_assert! { program: "(range 5 2)", matches: YalError::Type(_) }
    yal_assert! { program: "(append '(1 2) '(3) '(4 5))", result: "(1 2 3 4 5)" }
    yal_assert! { program: "(append '(1) 2)", result: "(1 . 2)" }
    yal_assert! { program: "(append)", result: "nil" }

    yal_assert! { program: "(define p (list 1 2)) (set-car! p 10) p", result: "(10 2)" }
    yal_assert! { program: "(define p (list 1 2)) (set-cdr! p 3) p", result: "(1 . 3)" }
    yal_assert! { program: "(set-car! nil 1)", matches: YalError::Type(_) }
    Ok(())
}

#[test]
fn test_predicates() -> Result<(), YalError> {
    yal_assert! { program: "(null? nil)", result: "#t" }
    yal_assert! { program: "(null? '(1))", result: "#f" }
    yal_assert! { program: "(pair? '(1))", result: "#t" }
    yal_assert! { program: "(pair? nil)", result: "#f" }
    yal_assert! { program: "(number? 1.5)", result: "#t" }
    yal_assert! { program: "(integer? 1.5)", result: "#f" }
    yal_assert! { program: "(integer? 2)", result: "#t" }
    yal_assert! { program: "(symbol? 'a)", result: "#t" }
    yal_assert! { program: "(string? \"s\")", result: "#t" }
    yal_assert! { program: "(procedure? car)", result: "#t" }
    yal_assert! { program: "(procedure? (lambda (x) x))", result: "#t" }
    yal_assert! { program: "(procedure? 1)", result: "#f" }
    yal_assert! { program: "(not #f)", result: "#t" }
    yal_assert! { program: "(not 0)", result: "#f" }
    yal_assert! { program: "(eq? 'a 'a)", result: "#t" }
    yal_assert! { program: "(eq? '(1) '(1))", result: "#f" }
    yal_assert! { program: "(define l '(1)) (eq? l l)", result: "#t" }
    yal_assert! { program: "(equal? '(1 (2 \"x\")) '(1 (2 \"x\")))", result: "#t" }
    yal_assert! { program: "(equal? '(1 2) '(1 2 3))", result: "#f" }
    yal_assert! { program: "(equal? 1 1.0)", result: "#f" }
    Ok(())
}

#[test]
fn test_strings_and_symbols() -> Result<(), YalError> {
    yal_assert! { program: "(string-append \"foo\" \"bar\")", result: "\"foobar\"" }
    yal_assert! { program: "(string-append)", result: "\"\"" }
    yal_assert! { program: "(string-length \"héllo\")", result: "5" }
    yal_assert! { program: "(symbol->string 'abc)", result: "\"abc\"" }
    yal_assert! { program: "(string->symbol \"xyz\")", result: "xyz" }
    yal_assert! { program: "(eq? (string->symbol \"abc\") 'abc)", result: "#t" }
    yal_assert! { program: "(string-append \"a\" 1)", matches: YalError::Type(_) }
    yal_assert! { program: "\"line\\nbreak\"", result: "\"line\\nbreak\"" }
    Ok(())
}

#[test]
fn test_higher_order() -> Result<(), YalError> {
    yal_assert! { program: "(map (lambda (x) (* x x)) '(1 2 3))", result: "(1 4 9)" }
    yal_assert! { program: "(map + '(1 2) '(10 20 30))", result: "(11 22)" }
    yal_assert! { program: "(map car nil)", result: "nil" }
    yal_assert! { program: "(apply + 1 2 '(3 4))", result: "10" }
    yal_assert! { program: "(apply list '())", result: "nil" }
    yal_assert! { program: "(apply + 1 2)", matches: YalError::Type(_) }
    yal_assert! { program: "(eval '(+ 1 2))", result: "3" }
    yal_assert! { program: "(eval (read \"(* 6 7)\"))", result: "42" }
    yal_assert! { program: "(read \"(a . b)\")", result: "(a . b)" }
    yal_assert! { program: "(read \"(a\")", matches: YalError::Syntax { .. } }
    Ok(())
}

#[test]
fn test_printer() -> Result<(), YalError> {
    yal_assert! { program: "(lambda (x) x)", result: "#<lambda>" }
    yal_assert! { program: "(define (sq x) (* x x)) sq", result: "#<lambda sq>" }
    yal_assert! { program: "(define f (lambda (x) x)) f", result: "#<lambda f>" }
    yal_assert! { program: "(define f (lambda (x) x)) (define g f) g", result: "#<lambda f>" }
    yal_assert! { program: "car", result: "#<primitive car>" }
    yal_assert! { program: "'x", result: "x" }
    yal_assert! { program: "''x", result: "'x" }
    yal_assert! { program: "'(quote x)", result: "'x" }
    yal_assert! { program: "'(1 . (2 . (3 . nil)))", result: "(1 2 3)" }
    yal_assert! { program: "1.5", result: "1.5" }
    yal_assert! { program: "2.0", result: "2.0" }
    yal_assert! { program: ".5", result: "0.5" }
    yal_assert! { program: "1e3", result: "1000.0" }
    yal_assert! { program: "#f", result: "#f" }
    yal_assert! { program: "; only a comment", result: "nil" }
    Ok(())
}

#[test]
fn test_syntax_errors() -> Result<(), YalError> {
    yal_assert! {
        program: "(+ 1",
        matches: YalError::Syntax { kind: SyntaxErrorKind::UnclosedList, offset: 0 }
    }
    yal_assert! {
        program: ")",
        matches: YalError::Syntax { kind: SyntaxErrorKind::UnexpectedClose, .. }
    }
    yal_assert! {
        program: "(1x)",
        matches: YalError::Syntax { kind: SyntaxErrorKind::MalformedNumber(_), .. }
    }
    yal_assert! {
        program: "\"\\q\"",
        matches: YalError::Syntax { kind: SyntaxErrorKind::BadEscape('q'), offset: 1 }
    }
    Ok(())
}

#[test]
fn test_printed_atoms_read_back() -> Result<(), YalError> {
    let mut interp = Interpreter::new();
    for src in [
        "42", "-7", "2.5", "1e-7", "\"tab\\there\"", "#t", "#f", "nil", "sym", "+inf", "-inf",
        "+nan",
    ] {
        let printed = interp.eval_to_string(&format!("'{}", src))?;
        let reprinted = interp.eval_to_string(&format!("'{}", printed))?;
        assert_eq!(printed, reprinted, "round trip of {}", src);
    }
    Ok(())
}

#[test]
fn test_non_finite_reals() -> Result<(), YalError> {
    yal_assert! { program: "(* 1e308 10)", result: "+inf" }
    yal_assert! { program: "(number? (* 1e308 10))", result: "#t" }
    yal_assert! { program: "(number? '+inf)", result: "#t" }
    yal_assert! { program: "(= (* 1e308 10) +inf)", result: "#t" }
    yal_assert! { program: "(- +inf)", result: "-inf" }
    yal_assert! { program: "(< -inf 0 +inf)", result: "#t" }
    yal_assert! { program: "(number? (read \"+nan\"))", result: "#t" }
    yal_assert! { program: "(symbol? 'inf)", result: "#t" }
    yal_assert! { program: "(symbol? '+infinity)", result: "#t" }
    Ok(())
}

#[test]
fn test_output_primitives() -> Result<(), YalError> {
    let out = Captured::default();
    let mut interp = Interpreter::new().with_output(out.clone());
    yal_assert! { interp: interp, program: "(print \"x =\" 42 '(a \"b\"))", result: "nil" }
    assert_eq!(out.text(), "x = 42 (a \"b\")\n");

    let out = Captured::default();
    let mut interp = Interpreter::new().with_output(out.clone());
    yal_assert! { interp: interp, program: "(write \"hi\")", result: "\"hi\"" }
    yal_assert! { interp: interp, program: "(begin (newline) (write 1) (newline) (write 'a))", result: "a" }
    yal_assert! { interp: interp, program: "(print)", result: "nil" }
    assert_eq!(out.text(), "\"hi\"\n1\na\n");

    yal_assert! { interp: interp, program: "(newline 1)", error: "newline: expected 0 argument(s), got 1" }
    Ok(())
}

#[test]
fn test_math_primitives() -> Result<(), YalError> {
    yal_assert! { program: "(sqrt 16)", result: "4.0" }
    yal_assert! { program: "(sqrt -1)", result: "+nan" }
    yal_assert! { program: "(floor 2.7)", result: "2.0" }
    yal_assert! { program: "(floor 3)", result: "3" }
    yal_assert! { program: "(ceil 2.1)", result: "3.0" }
    yal_assert! { program: "(ceil -2)", result: "-2" }
    yal_assert! { program: "(pow 2 10)", result: "1024" }
    yal_assert! { program: "(pow 2 -1)", result: "0.5" }
    yal_assert! { program: "(pow 2.0 3)", result: "8.0" }
    yal_assert! { program: "(pow 2 64)", matches: YalError::Type(_) }
    yal_assert! { program: "(exp 0)", result: "1.0" }
    yal_assert! { program: "(log 1)", result: "0.0" }
    yal_assert! { program: "(log 0)", result: "-inf" }
    yal_assert! { program: "(sin 0)", result: "0.0" }
    yal_assert! { program: "(cos 0)", result: "1.0" }
    yal_assert! { program: "(sqrt 'a)", error: "type error: sqrt: expected number, got symbol" }
    Ok(())
}

#[test]
fn test_error_primitive() -> Result<(), YalError> {
    let mut interp = Interpreter::new();
    yal_assert! { interp: interp, program: "(error \"bad thing:\" 'x 42 \"s\")", error: "bad thing: x 42 \"s\"" }
    yal_assert! { interp: interp, program: "(error 'oops)", error: "oops" }
    yal_assert! {
        interp: interp,
        program: "(define (safe-div a b) (if (= b 0) (error \"zero divisor\") (/ a b))) (safe-div 1 0)",
        matches: YalError::Raised(_)
    }
    yal_assert! { interp: interp, program: "(safe-div 6 3)", result: "2" }
    Ok(())
}

#[test]
fn test_deeply_nested_input_is_rejected() -> Result<(), YalError> {
    let mut interp = Interpreter::new();
    let outputs = interp.run_line(&"(".repeat(200_000));
    assert_eq!(outputs.len(), 1);
    assert!(matches!(
        outputs[0],
        Err(YalError::Syntax { kind: SyntaxErrorKind::TooDeep, .. })
    ));
    assert!(!interp.needs_more_input(&"(".repeat(200_000)));
    yal_assert! { interp: interp, program: "(+ 1 2)", result: "3" }
    Ok(())
}

#[test]
fn test_default_depth_limit_is_reported() {
    let program = "(define (f n) (if (= n 0) 0 (+ 1 (f (- n 1))))) (f 100000)";
    let result = std::thread::Builder::new()
        .stack_size(EVAL_STACK_SIZE)
        .spawn(move || {
            let mut interp = Interpreter::new();
            let deep = interp.eval_to_string(program);
            let shallow = interp.eval_to_string("(f 100)");
            (deep, shallow)
        })
        .expect("spawn evaluation thread")
        .join()
        .expect("evaluation thread finished");
    assert_eq!(result.0, Err(YalError::DepthExceeded(DEFAULT_MAX_DEPTH)));
    assert_eq!(result.1, Ok("100".to_string()));
}

#[test]
fn test_script_continues_after_read_errors() {
    let mut interp = Interpreter::new();
    let outputs = interp.run_script("(+ 1\n)) \n(+ 2 3)\n(define x\n  10)\nx\n(car");
    assert_eq!(outputs.len(), 6);
    assert_eq!(outputs[0], Ok("1".to_string()));
    assert!(matches!(
        outputs[1],
        Err(YalError::Syntax { kind: SyntaxErrorKind::UnexpectedClose, .. })
    ));
    assert_eq!(outputs[2], Ok("5".to_string()));
    assert_eq!(outputs[3], Ok("x".to_string()));
    assert_eq!(outputs[4], Ok("10".to_string()));
    assert!(matches!(
        outputs[5],
        Err(YalError::Syntax { kind: SyntaxErrorKind::UnclosedList, .. })
    ));
}

#[test]
fn test_immediate_definitions_do_not_retain_the_line() -> Result<(), YalError> {
    let mut interp = Interpreter::with_config(Config::default().with_arena_size(64 * 1024));
    yal_assert! { interp: interp, program: "(define n (length (range 0 200)))", result: "n" }
    let live = interp.heap.stats().live_blocks;
    for _ in 0..50 {
        yal_assert! { interp: interp, program: "(define n (length (range 0 200)))", result: "n" }
        yal_assert! { interp: interp, program: "(set! n (+ n 1))", result: "201" }
    }
    assert_eq!(interp.heap.stats().live_blocks, live);

    yal_assert! {
        interp: interp,
        program: "(define tick (let ((count 0)) (lambda () (set! count (+ count 1)) count)))",
        result: "tick"
    }
    let live = interp.heap.stats().live_blocks;
    for _ in 0..50 {
        interp.eval_to_string("(tick)")?;
    }
    assert_eq!(interp.heap.stats().live_blocks, live);
    yal_assert! { interp: interp, program: "(tick)", result: "51" }
    interp.heap.allocator().check().expect("arena consistent");
    Ok(())
}

#[test]
fn test_session_state() -> Result<(), YalError> {
    let mut interp = Interpreter::new();
    yal_assert! { interp: interp, program: "(define (make-adder n) (lambda (x) (+ x n)))", result: "make-adder" }
    yal_assert! { interp: interp, program: "(define add5 (make-adder 5))", result: "add5" }
    yal_assert! { interp: interp, program: "(add5 10)", result: "15" }
    yal_assert! { interp: interp, program: "(define cell (list 0))", result: "cell" }
    yal_assert! { interp: interp, program: "(set-car! cell (list 1 2))", result: "(1 2)" }
    yal_assert! { interp: interp, program: "cell", result: "((1 2))" }
    interp.heap.allocator().check().expect("arena consistent");
    Ok(())
}

#[test]
fn test_garbage_lines_do_not_grow_the_heap() -> Result<(), YalError> {
    let mut interp = Interpreter::new();
    interp.eval_to_string("(define keep (list 1 2 3))")?;
    let live = interp.heap.stats().live_blocks;
    for _ in 0..100 {
        interp.eval_to_string("(map (lambda (x) (list x x)) (range 0 20))")?;
        interp.eval_to_string("(let ((tmp (string-append \"a\" \"b\"))) tmp)")?;
    }
    assert_eq!(interp.heap.stats().live_blocks, live);
    assert_eq!(interp.eval_to_string("keep")?, "(1 2 3)");
    Ok(())
}

#[test]
fn test_out_of_memory_is_recoverable() -> Result<(), YalError> {
    let mut interp = Interpreter::with_config(Config::default().with_arena_size(4096));
    yal_assert! { interp: interp, program: "(range 0 1000)", matches: YalError::OutOfMemory { .. } }
    yal_assert! { interp: interp, program: "(+ 1 2)", result: "3" }
    yal_assert! { interp: interp, program: "(length (range 0 10))", result: "10" }
    Ok(())
}

#[test]
fn test_heap_stats() -> Result<(), YalError> {
    let mut interp = Interpreter::with_config(Config::default().with_arena_size(65536));
    yal_assert! { interp: interp, program: "(car (heap-stats))", result: "65536" }
    yal_assert! { interp: interp, program: "(length (heap-stats))", result: "4" }
    yal_assert! {
        interp: interp,
        program: "(= (+ (second (heap-stats)) (third (heap-stats))) (first (heap-stats)))",
        result: "#t"
    }
    Ok(())
}

#[test]
fn test_depth_limit() -> Result<(), YalError> {
    let mut interp = Interpreter::with_config(Config::default().with_max_depth(100));
    yal_assert! {
        interp: interp,
        program: "(define (loop n) (loop (+ n 1))) (loop 0)",
        matches: YalError::DepthExceeded(100)
    }
    yal_assert! { interp: interp, program: "(loop)", error: "loop: expected 1 argument(s), got 0" }
    Ok(())
}
