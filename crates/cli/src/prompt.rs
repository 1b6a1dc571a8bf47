//! Terminal prompts for missing credentials.

use std::io::{BufRead, Write};

/// Prompt for a line of input on the controlling terminal.
///
/// # Arguments
/// * `label` - Prompt text
pub fn read_line(label: &str) -> Result<String, String> {
    print!("{}", label);
    std::io::stdout().flush().map_err(|e| e.to_string())?;

    let mut line: String = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut line)
        .map_err(|e| e.to_string())?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

/// Prompt for a password with terminal echo disabled.
///
/// Falls back to a plain read when stdin is not a TTY (piped input).
///
/// # Arguments
/// * `label` - Prompt text
pub fn read_password(label: &str) -> Result<String, String> {
    #[cfg(unix)]
    {
        if unsafe { libc::isatty(libc::STDIN_FILENO) } == 1 {
            return read_password_no_echo(label);
        }
    }
    read_line(label)
}

#[cfg(unix)]
fn read_password_no_echo(label: &str) -> Result<String, String> {
    print!("{}", label);
    std::io::stdout().flush().map_err(|e| e.to_string())?;

    let mut term: libc::termios = unsafe { std::mem::zeroed() };
    if unsafe { libc::tcgetattr(libc::STDIN_FILENO, &mut term) } != 0 {
        return Err("could not read terminal attributes".to_string());
    }
    let original: libc::termios = term;
    term.c_lflag &= !libc::ECHO;
    if unsafe { libc::tcsetattr(libc::STDIN_FILENO, libc::TCSANOW, &term) } != 0 {
        return Err("could not disable terminal echo".to_string());
    }

    let mut line: String = String::new();
    let result: std::io::Result<usize> = std::io::stdin().lock().read_line(&mut line);

    unsafe { libc::tcsetattr(libc::STDIN_FILENO, libc::TCSANOW, &original) };
    println!();

    result.map_err(|e| e.to_string())?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}
