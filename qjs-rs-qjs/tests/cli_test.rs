mod support;

use indoc::indoc;
use regex::Regex;

use crate::support::{fixture, qjs, qjs_in};

#[test]
fn silent_expression() {
    let run = qjs(&["-e", "1+2"]);
    assert_eq!(run.stdout, "");
    assert_eq!(run.code, Some(0), "{}", run.stderr);
}

#[test]
fn printing_expression() {
    let run = qjs(&["-e", "console.log(1+2)"]);
    assert_eq!(run.stdout, "3\n");
    assert_eq!(run.code, Some(0));

    let run = qjs(&["-eprint('packed', 1, true)"]);
    assert_eq!(run.stdout, "packed 1 true\n");
}

#[test]
fn memory_limit_exhaustion() {
    let run = qjs(&["--memory-limit", "1k", "-e", "var a=[];for(;;)a.push(0)"]);
    assert_ne!(run.code, Some(0));
    assert!(!run.stderr.is_empty());
}

#[test]
fn memory_limit_exhaustion_in_script() {
    let run = qjs(&["--memory-limit", "8M", "-e", "var a=[];for(;;)a.push({})"]);
    assert_eq!(run.code, Some(1));
    assert!(run.stderr.contains("out of memory"), "{}", run.stderr);
}

#[test]
fn export_in_script_mode() {
    let (_dir, path) = fixture(&[("file.mjs", "export const x=1")]);
    let run = qjs_in(&path, &["--script", "file.mjs"]);
    assert_eq!(run.code, Some(1));
    assert!(run.stderr.contains("SyntaxError"), "{}", run.stderr);
}

#[test]
fn empty_run_with_dump() {
    let run = qjs(&["-q", "-d"]);
    assert_eq!(run.code, Some(0), "{}", run.stderr);
    assert!(run.stdout.starts_with("QuickJS-ng memory usage -- "), "{}", run.stdout);

    let timing = Regex::new(
        r"\nInstantiation times \(ms\): \d+\.\d{3} = \d+\.\d{3}\+\d+\.\d{3}\+\d+\.\d{3}\+\d+\.\d{3}\n$",
    )
    .unwrap();
    assert!(timing.is_match(&run.stdout), "{}", run.stdout);
}

#[test]
fn double_dash_ends_options() {
    let (_dir, path) = fixture(&[]);
    let run = qjs_in(&path, &["--", "-e"]);
    assert_eq!(run.code, Some(1));
    assert!(run.stderr.starts_with("qjs: "), "{}", run.stderr);
    assert!(run.stderr.contains("-e"), "{}", run.stderr);
}

#[test]
fn includes_run_before_the_script() {
    let (_dir, path) = fixture(&[
        ("a.js", "print('a');"),
        ("b.js", "print('b');"),
        ("main.js", "print('main');"),
    ]);
    let run = qjs_in(&path, &["-I", "a.js", "-I", "b.js", "main.js"]);
    assert_eq!(run.stdout, "a\nb\nmain\n");
    assert_eq!(run.code, Some(0));
}

#[test]
fn std_flag_publishes_modules() {
    let run = qjs(&["--std", "-e", "print(typeof std.loadFile, typeof os.setTimeout)"]);
    assert_eq!(run.stdout, "function function\n");

    let run = qjs(&["-e", "print(typeof std)"]);
    assert_eq!(run.stdout, "undefined\n");
}

#[test]
fn script_argv_passthrough() {
    let (_dir, path) = fixture(&[("args.js", "print(JSON.stringify(scriptArgs));")]);
    let run = qjs_in(&path, &["-m", "args.js", "-x", "--y", "-", "--"]);
    assert_eq!(run.stdout, "[\"args.js\",\"-x\",\"--y\",\"-\",\"--\"]\n");

    let run = qjs_in(&path, &["-e", "print(scriptArgs.join())", "extra", "-i"]);
    assert_eq!(run.stdout, "extra,-i\n");
}

#[test]
fn module_autodetect_and_timers() {
    let (_dir, path) = fixture(&[(
        "timers.js",
        indoc! { r#"
            import * as os from "os";
            const order = [];
            os.setTimeout(() => order.push("timer"), 5);
            await Promise.resolve().then(() => order.push("job"));
            await new Promise(resolve => os.setTimeout(resolve, 10));
            print(order.join(), import.meta.main, import.meta.url.startsWith("file://"));
        "# },
    )]);
    let run = qjs_in(&path, &["timers.js"]);
    assert_eq!(run.stdout, "job,timer true true\n", "{}", run.stderr);
}

#[test]
fn trace_output() {
    let run = qjs(&["-T", "-e", "var s = 'x'.repeat(1000)"]);
    assert_eq!(run.code, Some(0));

    let line = Regex::new(
        r"^(A \d+ -> (H[+-]\d{5,}\.\d+|NULL)|F H[+-]\d{5,}\.\d+|C \d+ \d+ -> \S+|R \d+ H\S+( -> \S+)?)$",
    )
    .unwrap();
    let lines = run.stdout.lines().collect::<Vec<_>>();
    assert!(!lines.is_empty());
    for trace in lines {
        assert!(line.is_match(trace), "unexpected trace line: {trace}");
    }
}

#[test]
fn help_and_bad_options() {
    let run = qjs(&["-h"]);
    assert_eq!(run.code, Some(1));
    assert!(run.stdout.contains("usage: qjs [options] [file [args]]"));

    let run = qjs(&["-z"]);
    assert_eq!(run.code, Some(1));
    assert_eq!(run.stderr, "qjs: unknown option '-z'\n");
    assert!(run.stdout.contains("usage: qjs"));

    let run = qjs(&["-e"]);
    assert_eq!(run.code, Some(2));

    let run = qjs(&["-I"]);
    assert_eq!(run.code, Some(1));
    assert_eq!(run.stderr, "qjs: expecting filename\n");
}

#[test]
fn unhandled_rejections() {
    let run = qjs(&["-e", "Promise.reject(new Error('lost'))"]);
    assert_eq!(run.code, Some(0));
    assert!(
        run.stderr.starts_with("Possibly unhandled promise rejection: Error: lost"),
        "{}",
        run.stderr
    );

    let run = qjs(&["--no-unhandled-rejection", "-e", "Promise.reject(new Error('lost'))"]);
    assert_eq!(run.stderr, "");
}

#[test]
fn repl_on_empty_input() {
    let run = qjs(&[]);
    assert_eq!(run.code, Some(0), "{}", run.stderr);
    assert!(run.stdout.starts_with("QuickJS-ng"), "{}", run.stdout);
}

#[test]
fn stripped_source() {
    let run = qjs(&[
        "--strip-source",
        "-e",
        "print(String(function f() { return 'body'; }).includes('body'))",
    ]);
    assert_eq!(run.stdout, "false\n");
}

#[test]
fn stripped_module() {
    let (_dir, path) = fixture(&[(
        "strip.mjs",
        indoc! { r#"
            function f() { return 'body'; }
            print(String(f).includes('body'));
        "# },
    )]);

    for flag in ["--strip-source", "-s"] {
        let run = qjs_in(&path, &[flag, "strip.mjs"]);
        assert_eq!(run.stdout, "false\n", "{flag}: {}", run.stderr);
        assert_eq!(run.code, Some(0));
    }

    let run = qjs_in(&path, &["strip.mjs"]);
    assert_eq!(run.stdout, "true\n");
}

#[test]
fn throwing_module_is_reported_once() {
    let (_dir, path) = fixture(&[("boom.mjs", "throw new Error('boom');")]);
    let run = qjs_in(&path, &["boom.mjs"]);
    assert_eq!(run.code, Some(1));
    assert_eq!(run.stderr.matches("Error: boom").count(), 1, "{}", run.stderr);
    assert!(!run.stderr.contains("Possibly unhandled"), "{}", run.stderr);
}

#[test]
fn embedded_nul_in_source() {
    let (_dir, path) = fixture(&[("nul.js", "print('a\0b'.length);")]);
    let run = qjs_in(&path, &["nul.js"]);
    assert_eq!(run.stdout, "3\n", "{}", run.stderr);
    assert_eq!(run.code, Some(0));
}

#[test]
fn infinite_timeout_fires() {
    let run = qjs(&["--std", "-e", "os.setTimeout(() => print(1), Infinity)"]);
    assert_eq!(run.stdout, "1\n", "{}", run.stderr);
    assert_eq!(run.code, Some(0));
}
