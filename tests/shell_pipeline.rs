//! Shell kernel end-to-end behaviour: quoting, chains, pipes,
//! redirections, privilege stacking and scripts.

mod common;

use common::boot_device;

#[test]
fn echo_redirect_cat_round_trip() {
    let mut device = boot_device();
    let out = device.execute("echo hello > /tmp/a && cat /tmp/a");
    assert_eq!(out, "hello\n");

    let out = device.execute("cat /tmp/a | wc -c");
    assert_eq!(out.trim(), "6");
}

#[test]
fn append_redirection_accumulates() {
    let mut device = boot_device();
    device.execute("echo one > /tmp/log");
    device.execute("echo two >> /tmp/log");
    assert_eq!(device.execute("cat /tmp/log"), "one\ntwo\n");
}

#[test]
fn chain_operators_respect_exit_codes() {
    let mut device = boot_device();
    let out = device.execute("cat /missing && echo yes");
    assert!(!out.contains("yes"));

    let out = device.execute("cat /missing || echo fallback");
    assert!(out.contains("fallback"));

    let out = device.execute("echo a; cat /missing; echo b");
    assert!(out.contains("a\n"));
    assert!(out.contains("b\n"));
}

#[test]
fn stderr_redirect_discards_to_dev_null() {
    let mut device = boot_device();
    let out = device.execute("cat /missing 2>/dev/null");
    assert_eq!(out, "");

    device.execute("cat /missing 2>/tmp/err");
    let err = device.execute("cat /tmp/err");
    assert!(err.contains("No such file or directory"));
}

#[test]
fn stdin_redirect_feeds_command() {
    let mut device = boot_device();
    device.execute("echo banana > /tmp/fruit\necho apple >> /tmp/fruit");
    let out = device.execute("sort < /tmp/fruit");
    assert_eq!(out, "apple\nbanana\n");
}

#[test]
fn quoting_keeps_apostrophes_and_spaces() {
    let mut device = boot_device();
    assert_eq!(device.execute("echo don't stop"), "don't stop\n");
    assert_eq!(device.execute(r#"echo "two  spaces""#), "two  spaces\n");
}

#[test]
fn env_export_and_expansion() {
    let mut device = boot_device();
    device.execute("export GREETING=hi");
    assert_eq!(device.execute("echo $GREETING world"), "hi world\n");
    assert_eq!(device.execute("echo ${GREETING}-there"), "hi-there\n");
    // Unknown variables pass through unexpanded.
    assert_eq!(device.execute("echo $NOPE"), "$NOPE\n");
}

#[test]
fn pipeline_through_grep_and_wc() {
    let mut device = boot_device();
    device.execute("echo alpha > /tmp/words\necho beta >> /tmp/words\necho gamma >> /tmp/words");
    let out = device.execute("cat /tmp/words | grep a | wc -l");
    assert_eq!(out.trim(), "3");
    let out = device.execute("cat /tmp/words | grep -v beta | wc -l");
    assert_eq!(out.trim(), "2");
}

#[test]
fn unknown_command_reports_127() {
    let mut device = boot_device();
    let out = device.execute("frobnicate");
    assert_eq!(out, "frobnicate: command not found\n");
    assert_eq!(device.execute("echo $?").trim(), "127");
}

#[test]
fn root_only_guard_blocks_unprivileged_useradd() {
    let mut device = boot_device();
    device.execute("su admin");
    let out = device.execute("useradd mallory");
    assert!(out.contains("Permission denied"));
    device.execute("exit");
    assert_eq!(device.execute("useradd mallory"), "");
}

#[test]
fn shadow_is_unreadable_for_regular_users() {
    let mut device = boot_device();
    device.execute("su admin");
    let out = device.execute("cat /etc/shadow");
    assert!(out.contains("Permission denied"), "unexpected: {out}");
    device.execute("exit");
    assert!(device.execute("cat /etc/shadow").contains("root:"));
}

#[test]
fn sudo_su_exit_returns_to_original_user() {
    let mut device = boot_device();
    device.execute("su admin");
    assert_eq!(device.execute("whoami"), "admin\n");

    device.execute("sudo su");
    assert_eq!(device.execute("whoami"), "root\n");

    // The documented "sudo su" unwind: exit returns to admin, not root
    // twice over.
    device.execute("exit");
    assert_eq!(device.execute("whoami"), "admin\n");
}

#[test]
fn script_executes_with_positional_parameters() {
    let mut device = boot_device();
    device.execute("echo '#!/bin/sh' > /tmp/greet.sh");
    device.execute("echo 'echo script $1 of $#' >> /tmp/greet.sh");
    device.execute("chmod +x /tmp/greet.sh");
    let out = device.execute("/tmp/greet.sh world");
    assert_eq!(out, "script world of 1\n");
}

#[test]
fn script_for_loop_and_arithmetic() {
    let mut device = boot_device();
    device.execute("echo 'TOTAL=0' > /tmp/sum.sh");
    device.execute("echo 'for N in 1 2 3; do' >> /tmp/sum.sh");
    device.execute("echo 'TOTAL=$((TOTAL + N))' >> /tmp/sum.sh");
    device.execute("echo 'done' >> /tmp/sum.sh");
    device.execute("echo 'echo total=$TOTAL' >> /tmp/sum.sh");
    let out = device.execute("/tmp/sum.sh");
    assert_eq!(out, "total=6\n");
}

#[test]
fn tee_duplicates_to_file_and_stdout() {
    let mut device = boot_device();
    let out = device.execute("echo payload | tee /tmp/copy");
    assert_eq!(out, "payload\n");
    assert_eq!(device.execute("cat /tmp/copy"), "payload\n");
}

#[test]
fn glob_expansion_in_listing() {
    let mut device = boot_device();
    device.execute("touch /tmp/a.txt /tmp/b.txt /tmp/c.log");
    let out = device.execute("ls /tmp/*.txt");
    assert!(out.contains("a.txt"));
    assert!(out.contains("b.txt"));
    assert!(!out.contains("c.log"));
}
