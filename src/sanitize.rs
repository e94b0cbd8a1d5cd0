//! File name sanitization and output path collision handling.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Base name used when nothing survives sanitization.
pub const UNTITLED: &str = "untitled";

/// Maps a Cyrillic letter to its Latin replacement.
///
/// Hard and soft signs have no Latin counterpart and become `_`, which the
/// following filtering step drops.
fn transliterate_char(c: char) -> Option<&'static str> {
    Some(match c {
        'а' => "a",
        'б' => "b",
        'в' => "v",
        'г' => "g",
        'д' => "d",
        'е' | 'ё' => "e",
        'ж' => "j",
        'з' => "z",
        'и' => "i",
        'й' => "j",
        'к' => "k",
        'л' => "l",
        'м' => "m",
        'н' => "n",
        'о' => "o",
        'п' => "p",
        'р' => "r",
        'с' => "s",
        'т' => "t",
        'у' => "u",
        'ф' => "f",
        'х' => "h",
        'ц' => "z",
        'ч' => "c",
        'ш' | 'щ' => "s",
        'ъ' | 'ь' => "_",
        'ы' => "y",
        'э' => "e",
        'ю' => "u",
        'я' => "a",
        'А' => "A",
        'Б' => "B",
        'В' => "V",
        'Г' => "G",
        'Д' => "D",
        'Е' | 'Ё' => "E",
        'Ж' => "J",
        'З' => "Z",
        'И' => "I",
        'Й' => "J",
        'К' => "K",
        'Л' => "L",
        'М' => "M",
        'Н' => "N",
        'О' => "O",
        'П' => "P",
        'Р' => "R",
        'С' => "S",
        'Т' => "T",
        'У' => "U",
        'Ф' => "F",
        'Х' => "H",
        'Ц' => "Z",
        'Ч' => "C",
        'Ш' | 'Щ' => "S",
        'Ъ' | 'Ь' => "_",
        'Ы' => "Y",
        'Э' => "E",
        'Ю' => "U",
        'Я' => "A",
        _ => return None,
    })
}

/// Turns an arbitrary file stem into a lowercase ASCII alphanumeric name.
///
/// Cyrillic letters are transliterated in a single pass, everything that is
/// not an ASCII letter or digit afterwards is dropped, and an empty result
/// becomes [`UNTITLED`].
pub fn sanitize(name: &str) -> String {
    let mut transliterated = String::with_capacity(name.len());
    for c in name.chars() {
        match transliterate_char(c) {
            Some(latin) => transliterated.push_str(latin),
            None => transliterated.push(c),
        }
    }

    let cleaned: String = transliterated
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_lowercase())
        .collect();

    if cleaned.is_empty() {
        UNTITLED.to_string()
    } else {
        cleaned
    }
}

fn candidate(directory: &Path, base_name: &str, counter: u32) -> PathBuf {
    let file_name = match counter {
        0 => format!("{base_name}.wav"),
        n if base_name == UNTITLED => format!("{base_name}{n}.wav"),
        n => format!("{base_name}_{n}.wav"),
    };
    directory.join(file_name)
}

/// Returns the first `.wav` path in `directory` for `base_name` that does not
/// exist on disk.
///
/// Candidates are `base.wav`, `base_1.wav`, `base_2.wav`, ... and for
/// [`UNTITLED`] `untitled.wav`, `untitled1.wav`, ...
pub fn resolve(directory: &Path, base_name: &str) -> PathBuf {
    resolve_with(directory, base_name, &HashSet::new())
}

/// Like [`resolve`], but also skips every path in `reserved`.
///
/// Existence is checked for every candidate, the directory listing is never
/// cached.
pub fn resolve_with(directory: &Path, base_name: &str, reserved: &HashSet<PathBuf>) -> PathBuf {
    let mut counter = 0;
    loop {
        let path = candidate(directory, base_name, counter);
        if !path.exists() && !reserved.contains(&path) {
            return path;
        }
        counter += 1;
    }
}
