//! End to end checks: compile small units and read the resulting class files back

use classgen::gen::{self, Output, Settings};
use classgen::jvm::class_file::{
    ClassConstantIndex, ClassFile, Code, Constant, LineNumberTable, Serialize, Version,
};
use classgen::jvm::Error;
use classgen::tree::CompilationUnit;

/// Stands for a byte that depends on the constant pool layout
const ANY: i16 = -1;

fn settings(version: Version) -> Settings {
    let mut settings = Settings::new(version);
    settings.line_numbers = false;
    settings.local_variables = false;
    settings.source_file = false;
    settings
}

fn compile(json: &str, settings: &Settings) -> Output {
    let unit = CompilationUnit::from_json(json).expect("bad test unit");
    gen::compile(&unit, settings).expect("compilation failed")
}

/// Unit with a single class `p/A` holding the given members
fn unit(members: &str) -> String {
    format!(r#"{{ "source_file": "A.java", "classes": [ {{ "name": "p/A", "members": [ {} ] }} ] }}"#, members)
}

/// Round trip the class through its binary form
fn reread(class: &ClassFile) -> ClassFile {
    let mut bytes = vec![];
    class.serialize(&mut bytes).unwrap();
    let reread = ClassFile::from_bytes(&bytes).unwrap();
    assert_eq!(&reread, class);
    reread
}

fn method_code(class: &ClassFile, name: &str) -> Code {
    let method = class
        .method(name, None)
        .unwrap_or_else(|| panic!("no method {}", name));
    class
        .attribute(&method.attributes, "Code")
        .expect("no Code attribute")
        .decode_info::<Code>()
        .unwrap()
}

fn assert_code(code: &Code, expected: &[i16]) {
    let actual = &code.code_array.0;
    assert_eq!(actual.len(), expected.len(), "code was {:02x?}", actual);
    for (pc, (byte, expected)) in actual.iter().zip(expected).enumerate() {
        if *expected != ANY {
            assert_eq!(*byte as i16, *expected, "at {} in {:02x?}", pc, actual);
        }
    }
}

/// `(start, end, handler, catches everything)` rows of the exception table
fn handlers(code: &Code) -> Vec<(u16, u16, u16, bool)> {
    code.exception_table
        .iter()
        .map(|entry| {
            (
                entry.start_pc.0,
                entry.end_pc.0,
                entry.handler_pc.0,
                entry.catch_type.0 == 0,
            )
        })
        .collect()
}

const CALL_A: &str = r#"{ "kind": "expr", "expr": { "kind": "invoke",
    "method": { "owner": "p/A", "name": "a", "descriptor": "()V", "is_static": true } } }"#;
const CALL_B: &str = r#"{ "kind": "expr", "expr": { "kind": "invoke",
    "method": { "owner": "p/A", "name": "b", "descriptor": "()V", "is_static": true } } }"#;

fn only_class(output: Output) -> ClassFile {
    assert!(output.diagnostics.is_empty(), "{:?}", output.diagnostics);
    assert_eq!(output.classes.len(), 1);
    let (name, class) = output.classes.into_iter().next().unwrap();
    assert_eq!(name.as_ref(), "p/A");
    reread(&class)
}

#[test]
fn arithmetic() {
    let json = unit(
        r#"{ "kind": "method", "name": "add", "access_flags": 9, "return_type": "I",
             "params": [ { "id": 0, "name": "a", "type": "I" }, { "id": 1, "name": "b", "type": "I" } ],
             "body": { "kind": "block", "stmts": [ { "kind": "return", "value":
                 { "kind": "binary", "op": "add", "type": "I",
                   "left": { "kind": "local", "var": 0, "type": "I" },
                   "right": { "kind": "local", "var": 1, "type": "I" } } } ] } }"#,
    );
    let class = only_class(compile(&json, &settings(Version::JAVA8)));
    let code = method_code(&class, "add");
    assert_code(&code, &[0x1a, 0x1b, 0x60, 0xac]);
    assert_eq!(code.max_stack, 2);
    assert_eq!(code.max_locals, 2);
    assert!(code.exception_table.is_empty());
}

#[test]
fn add_immediate() {
    let json = unit(
        r#"{ "kind": "method", "name": "inc", "access_flags": 9, "return_type": "I",
             "params": [ { "id": 0, "name": "a", "type": "I" } ],
             "body": { "kind": "return", "value":
                 { "kind": "binary", "op": "add", "type": "I",
                   "left": { "kind": "local", "var": 0, "type": "I" },
                   "right": { "kind": "literal", "type": "I", "value": { "int": 1 } } } } }"#,
    );
    let class = only_class(compile(&json, &settings(Version::JAVA8)));
    let code = method_code(&class, "inc");
    assert_code(&code, &[0x1a, 0x04, 0x60, 0xac]);
    assert_eq!(code.max_stack, 2);
    assert_eq!(code.max_locals, 1);
}

#[test]
fn identical_strings_share_constants() {
    let method = |name: &str| {
        format!(
            r#"{{ "kind": "method", "name": "{}", "access_flags": 9, "return_type": "Ljava/lang/String;",
                 "body": {{ "kind": "return", "value":
                   {{ "kind": "literal", "type": "Ljava/lang/String;", "value": {{ "string": "hi" }} }} }} }}"#,
            name
        )
    };
    let json = unit(&format!("{}, {}", method("first"), method("second")));
    let class = only_class(compile(&json, &settings(Version::JAVA8)));

    let first = method_code(&class, "first").code_array.0;
    let second = method_code(&class, "second").code_array.0;
    assert_eq!(first[0], 0x12);
    assert_eq!(first, second);

    let utf8s = class
        .constants
        .values()
        .filter(|constant| matches!(constant, Constant::Utf8(text) if text == "hi"))
        .count();
    let strings = class
        .constants
        .values()
        .filter(|constant| matches!(constant, Constant::String(_)))
        .count();
    assert_eq!((utf8s, strings), (1, 1));
}

#[test]
fn counting_loop() {
    let json = unit(
        r#"{ "kind": "method", "name": "sum", "access_flags": 9, "return_type": "I",
             "params": [ { "id": 0, "name": "n", "type": "I" } ],
             "body": { "kind": "block", "stmts": [
               { "kind": "local_var", "var": { "id": 1, "name": "s", "type": "I" },
                 "init": { "kind": "literal", "type": "I", "value": { "int": 0 } } },
               { "kind": "for",
                 "init": [ { "kind": "local_var", "var": { "id": 2, "name": "i", "type": "I" },
                             "init": { "kind": "literal", "type": "I", "value": { "int": 0 } } } ],
                 "cond": { "kind": "binary", "op": "lt", "type": "Z",
                           "left": { "kind": "local", "var": 2, "type": "I" },
                           "right": { "kind": "local", "var": 0, "type": "I" } },
                 "update": [ { "kind": "unary", "op": "post_inc", "type": "I",
                               "operand": { "kind": "local", "var": 2, "type": "I" } } ],
                 "body": { "kind": "expr", "expr": { "kind": "compound_assign", "op": "add", "type": "I",
                           "target": { "kind": "local", "var": 1, "type": "I" },
                           "value": { "kind": "local", "var": 2, "type": "I" } } } },
               { "kind": "return", "value": { "kind": "local", "var": 1, "type": "I" } } ] } }"#,
    );
    let class = only_class(compile(&json, &settings(Version::JAVA8)));
    let code = method_code(&class, "sum");
    #[rustfmt::skip]
    assert_code(&code, &[
        0x03, 0x3c,             // int s = 0
        0x03, 0x3d,             // int i = 0
        0x1c, 0x1a,             // i < n
        0xa2, 0x00, 0x0d,       // if_icmpge 19
        0x1b, 0x1c, 0x60, 0x3c, // s += i
        0x84, 0x02, 0x01,       // i++
        0xa7, 0xff, 0xf4,       // goto 4
        0x1b, 0xac,             // return s
    ]);
    assert_eq!(code.max_locals, 3);

    // Loop head is a branch target
    assert!(class.attribute(&code.attributes, "StackMapTable").is_some());
}

#[test]
fn short_circuit_and() {
    let json = unit(
        r#"{ "kind": "method", "name": "both", "access_flags": 9, "return_type": "Z",
             "params": [ { "id": 0, "name": "a", "type": "Z" }, { "id": 1, "name": "b", "type": "Z" } ],
             "body": { "kind": "return", "value":
                 { "kind": "binary", "op": "cond_and", "type": "Z",
                   "left": { "kind": "local", "var": 0, "type": "Z" },
                   "right": { "kind": "local", "var": 1, "type": "Z" } } } }"#,
    );
    let class = only_class(compile(&json, &settings(Version::JAVA8)));
    let code = method_code(&class, "both");
    #[rustfmt::skip]
    assert_code(&code, &[
        0x1a, 0x99, 0x00, 0x0b, // a, ifeq 12
        0x1b, 0x99, 0x00, 0x07, // b, ifeq 12
        0x04, 0xa7, 0x00, 0x04, // true, goto 13
        0x03,                   // false
        0xac,
    ]);
}

#[test]
fn dense_switch_uses_table() {
    let case = |label: i32, result: i32| {
        format!(
            r#"{{ "labels": [ {} ], "body": [ {{ "kind": "return", "value":
                 {{ "kind": "literal", "type": "I", "value": {{ "int": {} }} }} }} ] }}"#,
            label, result
        )
    };
    let json = unit(&format!(
        r#"{{ "kind": "method", "name": "pick", "access_flags": 9, "return_type": "I",
             "params": [ {{ "id": 0, "name": "x", "type": "I" }} ],
             "body": {{ "kind": "switch", "selector": {{ "kind": "local", "var": 0, "type": "I" }},
               "cases": [ {}, {}, {}, {{ "is_default": true, "body": [ {{ "kind": "return", "value":
                 {{ "kind": "literal", "type": "I", "value": {{ "int": 0 }} }} }} ] }} ] }} }}"#,
        case(1, 10),
        case(2, 20),
        case(3, 30)
    ));
    let class = only_class(compile(&json, &settings(Version::JAVA8)));
    let code = method_code(&class, "pick");
    #[rustfmt::skip]
    assert_code(&code, &[
        0x1a,
        0xaa, 0, 0,     // tableswitch, padding
        0, 0, 0, 36,    // default
        0, 0, 0, 1,     // low
        0, 0, 0, 3,     // high
        0, 0, 0, 27,
        0, 0, 0, 30,
        0, 0, 0, 33,
        0x10, 10, 0xac,
        0x10, 20, 0xac,
        0x10, 30, 0xac,
        0x03, 0xac,
    ]);
}

#[test]
fn sparse_switch_uses_sorted_lookup() {
    let json = unit(
        r#"{ "kind": "method", "name": "pick", "access_flags": 9,
             "params": [ { "id": 0, "name": "x", "type": "I" } ],
             "body": { "kind": "switch", "selector": { "kind": "local", "var": 0, "type": "I" },
               "cases": [
                 { "labels": [ 1000 ], "body": [ { "kind": "break" } ] },
                 { "labels": [ 1, 100 ], "body": [ { "kind": "return" } ] } ] } }"#,
    );
    let class = only_class(compile(&json, &settings(Version::JAVA8)));
    let code = method_code(&class, "pick").code_array.0;
    assert_eq!(code[1], 0xab);
    let word = |at: usize| i32::from_be_bytes([code[at], code[at + 1], code[at + 2], code[at + 3]]);
    assert_eq!(word(8), 3);
    let keys: Vec<i32> = (0..3).map(|i| word(12 + 8 * i)).collect();
    assert_eq!(keys, vec![1, 100, 1000]);

    // No default case: the default offset and the `break` land on the final `return`
    let last = code.len() - 1;
    assert_eq!(code[last], 0xb1);
    assert_eq!(1 + word(4) as usize, last);
}

#[test]
fn string_concatenation() {
    let json = unit(
        r#"{ "kind": "method", "name": "concat", "access_flags": 9, "return_type": "Ljava/lang/String;",
             "params": [ { "id": 0, "name": "s", "type": "Ljava/lang/String;" },
                         { "id": 1, "name": "i", "type": "I" } ],
             "body": { "kind": "return", "value":
                 { "kind": "binary", "op": "add", "type": "Ljava/lang/String;",
                   "left": { "kind": "local", "var": 0, "type": "Ljava/lang/String;" },
                   "right": { "kind": "local", "var": 1, "type": "I" } } } }"#,
    );
    let class = only_class(compile(&json, &settings(Version::JAVA8)));
    let code = method_code(&class, "concat");
    #[rustfmt::skip]
    assert_code(&code, &[
        0xbb, ANY, ANY, 0x59, 0xb7, ANY, ANY, // new StringBuilder()
        0x2a, 0xb6, ANY, ANY,                 // append(s)
        0x1b, 0xb6, ANY, ANY,                 // append(i)
        0xb6, ANY, ANY,                       // toString()
        0xb0,
    ]);
}

#[test]
fn finally_inlined_at_every_exit() {
    let json = unit(&format!(
        r#"{{ "kind": "method", "name": "f", "access_flags": 9,
             "body": {{ "kind": "try", "body": {}, "finally": {} }} }}"#,
        CALL_A, CALL_B
    ));
    let class = only_class(compile(&json, &settings(Version::JAVA8)));
    let code = method_code(&class, "f");
    #[rustfmt::skip]
    assert_code(&code, &[
        0xb8, ANY, ANY,         // a()
        0xb8, ANY, ANY,         // b()
        0xa7, 0x00, 0x09,       // goto 15
        0x4b,                   // astore_0
        0xb8, ANY, ANY,         // b()
        0x2a, 0xbf,             // aload_0, athrow
        0xb1,
    ]);
    assert_eq!(handlers(&code), vec![(0, 3, 9, true)]);
}

#[test]
fn finally_as_subroutine_for_old_targets() {
    let json = unit(&format!(
        r#"{{ "kind": "method", "name": "f", "access_flags": 9,
             "body": {{ "kind": "try", "body": {}, "finally": {} }} }}"#,
        CALL_A, CALL_B
    ));
    let mut settings = settings(Version::from_release("1.4").unwrap());
    settings.finalizer_inline_limit = 0;
    let class = only_class(compile(&json, &settings));
    assert_eq!(class.version.major_version, 48);

    let code = method_code(&class, "f");
    #[rustfmt::skip]
    assert_code(&code, &[
        0xb8, ANY, ANY,         // a()
        0xa8, 0x00, 0x0c,       // jsr 15
        0xa7, 0x00, 0x0f,       // goto 21
        0x4b,                   // astore_0
        0xa8, 0x00, 0x05,       // jsr 15
        0x2a, 0xbf,             // aload_0, athrow
        0x4c,                   // astore_1
        0xb8, ANY, ANY,         // b()
        0xa9, 0x01,             // ret 1
        0xb1,
    ]);
    assert_eq!(handlers(&code), vec![(0, 6, 9, true), (9, 13, 9, true)]);
    assert_eq!(code.max_locals, 2);
    assert!(class.attribute(&code.attributes, "StackMapTable").is_none());
}

#[test]
fn synchronized_releases_monitor_on_both_paths() {
    let json = unit(&format!(
        r#"{{ "kind": "method", "name": "s", "access_flags": 9,
             "params": [ {{ "id": 0, "name": "o", "type": "Ljava/lang/Object;" }} ],
             "body": {{ "kind": "synchronized",
                        "lock": {{ "kind": "local", "var": 0, "type": "Ljava/lang/Object;" }},
                        "body": {} }} }}"#,
        CALL_A
    ));
    let class = only_class(compile(&json, &settings(Version::JAVA8)));
    let code = method_code(&class, "s");
    #[rustfmt::skip]
    assert_code(&code, &[
        0x2a, 0x59, 0x4c, 0xc2, // aload_0, dup, astore_1, monitorenter
        0xb8, ANY, ANY,         // a()
        0x2b, 0xc3,             // aload_1, monitorexit
        0xa7, 0x00, 0x08,       // goto 17
        0x4d,                   // astore_2
        0x2b, 0xc3,             // aload_1, monitorexit
        0x2c, 0xbf,             // aload_2, athrow
        0xb1,
    ]);
    assert_eq!(handlers(&code), vec![(4, 9, 12, true), (12, 15, 12, true)]);
}

#[test]
fn break_runs_finalizer() {
    let json = unit(&format!(
        r#"{{ "kind": "method", "name": "f", "access_flags": 9,
             "params": [ {{ "id": 0, "name": "c", "type": "Z" }} ],
             "body": {{ "kind": "while", "cond": {{ "kind": "literal", "type": "Z", "value": {{ "int": 1 }} }},
               "body": {{ "kind": "try", "finally": {},
                 "body": {{ "kind": "block", "stmts": [
                   {{ "kind": "if", "cond": {{ "kind": "local", "var": 0, "type": "Z" }},
                     "then": {{ "kind": "break" }} }},
                   {} ] }} }} }} }}"#,
        CALL_B, CALL_A
    ));
    let class = only_class(compile(&json, &settings(Version::JAVA8)));
    let code = method_code(&class, "f");
    #[rustfmt::skip]
    assert_code(&code, &[
        0x1a, 0x99, 0x00, 0x09, // if (c)
        0xb8, ANY, ANY,         // b()
        0xa7, 0x00, 0x12,       // break: goto 25
        0xb8, ANY, ANY,         // a()
        0xb8, ANY, ANY,         // b()
        0xa7, 0xff, 0xf0,       // goto 0
        0x4c,                   // astore_1
        0xb8, ANY, ANY,         // b()
        0x2b, 0xbf,             // aload_1, athrow
        0xb1,
    ]);
    // The inlined finalizers are not covered by the handler
    assert_eq!(handlers(&code), vec![(0, 4, 19, true), (10, 13, 19, true)]);
}

#[test]
fn empty_try_runs_finalizer_in_line() {
    let json = unit(&format!(
        r#"{{ "kind": "method", "name": "f", "access_flags": 9,
             "body": {{ "kind": "try", "body": {{ "kind": "block", "stmts": [] }}, "finally": {} }} }},
           {{ "kind": "method", "name": "t", "access_flags": 9,
             "body": {{ "kind": "try", "body": {{ "kind": "block", "stmts": [] }},
                        "finally": {{ "kind": "return" }} }} }}"#,
        CALL_B
    ));
    let mut subroutines = settings(Version::from_release("1.4").unwrap());
    subroutines.finalizer_inline_limit = 0;

    for target in [settings(Version::JAVA8), subroutines] {
        let class = only_class(compile(&json, &target));

        // Nothing to protect: no handler, and no `jsr` to a subroutine that never gets placed
        let code = method_code(&class, "f");
        assert_code(&code, &[0xb8, ANY, ANY, 0xb1]);
        assert!(code.exception_table.is_empty());
        assert_eq!(code.max_locals, 0);

        let code = method_code(&class, "t");
        assert_code(&code, &[0xb1]);
        assert!(code.exception_table.is_empty());
    }
}

#[test]
fn labelled_jumps_run_finalizer() {
    let json = unit(&format!(
        r#"{{ "kind": "method", "name": "f", "access_flags": 9,
             "params": [ {{ "id": 0, "name": "c", "type": "Z" }} ],
             "body": {{ "kind": "labelled", "label": "outer", "body":
               {{ "kind": "while", "cond": {{ "kind": "literal", "type": "Z", "value": {{ "int": 1 }} }},
                 "body": {{ "kind": "try", "finally": {},
                   "body": {{ "kind": "block", "stmts": [
                     {{ "kind": "if", "cond": {{ "kind": "local", "var": 0, "type": "Z" }},
                       "then": {{ "kind": "continue", "label": "outer" }} }},
                     {{ "kind": "break", "label": "outer" }} ] }} }} }} }} }}"#,
        CALL_B
    ));
    let class = only_class(compile(&json, &settings(Version::JAVA8)));
    let code = method_code(&class, "f");
    #[rustfmt::skip]
    assert_code(&code, &[
        0x1a, 0x99, 0x00, 0x09, // if (c)
        0xb8, ANY, ANY,         // b()
        0xa7, 0xff, 0xf9,       // continue outer: goto 0
        0xb8, ANY, ANY,         // b()
        0xa7, 0x00, 0x09,       // break outer: goto 22
        0x4c,                   // astore_1
        0xb8, ANY, ANY,         // b()
        0x2b, 0xbf,             // aload_1, athrow
        0xb1,
    ]);
    assert_eq!(handlers(&code), vec![(0, 4, 16, true)]);
}

#[test]
fn return_from_synchronized_releases_monitor_once() {
    let json = unit(
        r#"{ "kind": "method", "name": "r", "access_flags": 9,
             "params": [ { "id": 0, "name": "o", "type": "Ljava/lang/Object;" } ],
             "body": { "kind": "synchronized",
                       "lock": { "kind": "local", "var": 0, "type": "Ljava/lang/Object;" },
                       "body": { "kind": "block", "stmts": [ { "kind": "return" } ] } } }"#,
    );
    let class = only_class(compile(&json, &settings(Version::JAVA8)));
    let code = method_code(&class, "r");
    #[rustfmt::skip]
    assert_code(&code, &[
        0x2a, 0x59, 0x4c, 0xc2, // aload_0, dup, astore_1, monitorenter
        0x2b, 0xc3,             // aload_1, monitorexit
        0xb1,                   // return
        0x4d,                   // astore_2
        0x2b, 0xc3,             // aload_1, monitorexit
        0x2c, 0xbf,             // aload_2, athrow
    ]);
    assert_eq!(handlers(&code), vec![(4, 6, 7, true), (7, 10, 7, true)]);
}

#[test]
fn loop_jumps_out_of_synchronized_release_monitor_once() {
    let json = unit(
        r#"{ "kind": "method", "name": "s", "access_flags": 9,
             "params": [ { "id": 0, "name": "o", "type": "Ljava/lang/Object;" },
                         { "id": 1, "name": "c", "type": "Z" } ],
             "body": { "kind": "while", "cond": { "kind": "literal", "type": "Z", "value": { "int": 1 } },
               "body": { "kind": "synchronized",
                 "lock": { "kind": "local", "var": 0, "type": "Ljava/lang/Object;" },
                 "body": { "kind": "block", "stmts": [
                   { "kind": "if", "cond": { "kind": "local", "var": 1, "type": "Z" },
                     "then": { "kind": "continue" } },
                   { "kind": "break" } ] } } } }"#,
    );
    let class = only_class(compile(&json, &settings(Version::JAVA8)));
    let code = method_code(&class, "s");
    #[rustfmt::skip]
    assert_code(&code, &[
        0x2a, 0x59, 0x4d, 0xc2, // aload_0, dup, astore_2, monitorenter
        0x1b, 0x99, 0x00, 0x08, // if (c)
        0x2c, 0xc3,             // aload_2, monitorexit
        0xa7, 0xff, 0xf6,       // continue: goto 0
        0x2c, 0xc3,             // aload_2, monitorexit
        0xa7, 0x00, 0x08,       // break: goto 23
        0x4e,                   // astore_3
        0x2c, 0xc3,             // aload_2, monitorexit
        0x2d, 0xbf,             // aload_3, athrow
        0xb1,
    ]);
    assert_eq!(
        handlers(&code),
        vec![(4, 10, 18, true), (13, 15, 18, true), (18, 21, 18, true)]
    );
}

#[test]
fn multi_catch_gets_a_row_per_alternative() {
    let json = unit(&format!(
        r#"{{ "kind": "method", "name": "m", "access_flags": 9,
             "body": {{ "kind": "try", "body": {},
               "catches": [ {{
                 "types": [ "java/lang/IllegalStateException", "java/lang/IllegalArgumentException" ],
                 "param": {{ "id": 0, "name": "e", "type": "Ljava/lang/RuntimeException;" }},
                 "body": {} }} ] }} }}"#,
        CALL_A, CALL_B
    ));
    let class = only_class(compile(&json, &settings(Version::JAVA8)));
    let code = method_code(&class, "m");
    #[rustfmt::skip]
    assert_code(&code, &[
        0xb8, ANY, ANY,         // a()
        0xa7, 0x00, 0x07,       // goto 10
        0x4b,                   // astore_0
        0xb8, ANY, ANY,         // b()
        0xb1,
    ]);
    assert_eq!(handlers(&code), vec![(0, 3, 6, false), (0, 3, 6, false)]);
    let caught: Vec<&str> = code
        .exception_table
        .iter()
        .map(|entry| class.class_name(ClassConstantIndex(entry.catch_type)).unwrap())
        .collect();
    assert_eq!(
        caught,
        vec!["java/lang/IllegalStateException", "java/lang/IllegalArgumentException"]
    );
}

#[test]
fn long_forward_jump_goes_wide() {
    let calls = vec![CALL_A; 11_000].join(", ");
    let json = unit(&format!(
        r#"{{ "kind": "method", "name": "big", "access_flags": 9,
             "params": [ {{ "id": 0, "name": "x", "type": "Z" }} ],
             "body": {{ "kind": "if", "cond": {{ "kind": "local", "var": 0, "type": "Z" }},
                        "then": {{ "kind": "block", "stmts": [ {} ] }} }} }}"#,
        calls
    ));
    let class = only_class(compile(&json, &settings(Version::JAVA8)));
    let code = method_code(&class, "big").code_array.0;

    // `ifeq` becomes `ifne` over a `goto_w`
    assert_eq!(&code[..4], &[0x1a, 0x9a, 0x00, 0x08]);
    assert_eq!(code[4], 0xc8);
    let offset = i32::from_be_bytes([code[5], code[6], code[7], code[8]]);
    let last = code.len() - 1;
    assert_eq!(code[last], 0xb1);
    assert_eq!(4 + offset as usize, last);
    assert_eq!(code.len(), 9 + 3 * 11_000 + 5 + 1);
}

#[test]
fn limit_violation_only_drops_its_class() {
    let params = (0..256)
        .map(|i| format!(r#"{{ "id": {}, "name": "p{}", "type": "I" }}"#, i, i))
        .collect::<Vec<_>>()
        .join(", ");
    let json = format!(
        r#"{{ "classes": [
             {{ "name": "p/Big", "members": [ {{ "kind": "method", "name": "many", "access_flags": 9,
                  "params": [ {} ], "body": {{ "kind": "block", "stmts": [] }} }} ] }},
             {{ "name": "p/Small", "members": [ {{ "kind": "method", "name": "none", "access_flags": 9,
                  "body": {{ "kind": "block", "stmts": [] }} }} ] }} ] }}"#,
        params
    );
    let output = compile(&json, &settings(Version::JAVA8));

    assert_eq!(output.classes.len(), 1);
    assert_eq!(output.classes[0].0.as_ref(), "p/Small");
    assert_eq!(output.diagnostics.len(), 1);
    let diagnostic = &output.diagnostics[0];
    assert_eq!(diagnostic.class.as_ref(), "p/Big");
    assert!(diagnostic.method.as_deref().unwrap().starts_with("many(IIII"));
    assert!(matches!(diagnostic.error, Error::TooManyParameters(_)));
}

#[test]
fn field_initializers_move_into_code() {
    let json = unit(
        r#"{ "kind": "field", "name": "K", "type": "I", "access_flags": 24, "constant": { "int": 3 } },
           { "kind": "field", "name": "s", "type": "I", "access_flags": 8,
             "init": { "kind": "literal", "type": "I", "value": { "int": 4 } } },
           { "kind": "field", "name": "x", "type": "I",
             "init": { "kind": "literal", "type": "I", "value": { "int": 5 } } },
           { "kind": "method", "name": "<init>", "access_flags": 1,
             "body": { "kind": "block", "stmts": [ { "kind": "expr", "expr": { "kind": "invoke",
                 "receiver": "super",
                 "method": { "owner": "java/lang/Object", "name": "<init>", "descriptor": "()V" } } } ] } }"#,
    );
    let class = only_class(compile(&json, &settings(Version::JAVA8)));

    let constant = &class.fields[0];
    assert_eq!(class.utf8(constant.name_index), Some("K"));
    assert!(class.attribute(&constant.attributes, "ConstantValue").is_some());
    assert!(class.attribute(&class.fields[1].attributes, "ConstantValue").is_none());

    let init = method_code(&class, "<init>");
    #[rustfmt::skip]
    assert_code(&init, &[
        0x2a, 0xb7, ANY, ANY,       // super()
        0x2a, 0x08, 0xb5, ANY, ANY, // this.x = 5
        0xb1,
    ]);

    let clinit = method_code(&class, "<clinit>");
    assert_code(&clinit, &[0x07, 0xb3, ANY, ANY, 0xb1]);
}

#[test]
fn debug_attributes() {
    let json = unit(
        r#"{ "kind": "method", "name": "id", "access_flags": 9, "return_type": "I",
             "params": [ { "id": 0, "name": "a", "type": "I" } ],
             "body": { "kind": "block", "stmts": [ { "kind": "return", "line": 7,
                 "value": { "kind": "local", "var": 0, "type": "I" } } ] } }"#,
    );
    let mut settings = Settings::new(Version::JAVA8);
    settings.line_numbers = true;
    settings.local_variables = true;
    settings.source_file = true;
    let class = only_class(compile(&json, &settings));

    let source_file = class
        .attribute(&class.attributes, "SourceFile")
        .expect("no SourceFile attribute");
    assert_eq!(source_file.info.len(), 2);

    let code = method_code(&class, "id");
    let lines = class
        .attribute(&code.attributes, "LineNumberTable")
        .expect("no LineNumberTable")
        .decode_info::<LineNumberTable>()
        .unwrap();
    assert_eq!(lines.0.len(), 1);
    assert_eq!(lines.0[0].start_pc.0, 0);
    assert_eq!(lines.0[0].line_number, 7);
    assert!(class.attribute(&code.attributes, "LocalVariableTable").is_some());
}
