//! mc-remote core 데몬 공용 유틸리티

use tokio::process::Command;

/// Windows 에서 콘솔 창을 숨기는 플래그를 적용합니다. 그 외 플랫폼에서는 아무것도 하지 않습니다.
#[cfg(target_os = "windows")]
pub fn apply_creation_flags(cmd: &mut Command) -> &mut Command {
    use std::os::windows::process::CommandExt;
    const CREATE_NO_WINDOW: u32 = 0x08000000;
    cmd.creation_flags(CREATE_NO_WINDOW)
}

#[cfg(not(target_os = "windows"))]
pub fn apply_creation_flags(cmd: &mut Command) -> &mut Command {
    cmd
}

/// POSIX 셸에 그대로 끼워 넣을 수 있도록 값을 작은따옴표로 감쌉니다.
/// 내부의 작은따옴표는 `'\''` 로 치환됩니다.
pub fn shell_quote(value: &str) -> String {
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('\'');
    for ch in value.chars() {
        if ch == '\'' {
            quoted.push_str("'\\''");
        } else {
            quoted.push(ch);
        }
    }
    quoted.push('\'');
    quoted
}

/// 원격 디렉토리와 세션 이름에 쓰는 소문자 슬러그. `[a-z0-9]` 외의 문자는 `-` 하나로 합칩니다.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_dash = false;
    for ch in name.trim().chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(ch.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }
    if slug.is_empty() {
        slug.push_str("server");
    }
    slug
}
