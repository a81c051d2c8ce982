//! 最小 CSV 读写：逗号分隔，双引号包裹，`""` 转义，引号内允许换行。

/// 把文本切分为记录；完全空白的行被跳过。
pub fn parse_records(text: &str) -> Vec<Vec<String>> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let mut records = Vec::new();
    let mut record = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = text.chars().peekable();

    while let Some(ch) = chars.next() {
        if in_quotes {
            if ch == '"' {
                if chars.peek() == Some(&'"') {
                    field.push('"');
                    chars.next();
                } else {
                    in_quotes = false;
                }
            } else {
                field.push(ch);
            }
            continue;
        }
        match ch {
            '"' => in_quotes = true,
            ',' => record.push(std::mem::take(&mut field)),
            '\r' => {}
            '\n' => {
                record.push(std::mem::take(&mut field));
                push_record(&mut records, std::mem::take(&mut record));
            }
            _ => field.push(ch),
        }
    }
    if !field.is_empty() || !record.is_empty() {
        record.push(field);
        push_record(&mut records, record);
    }
    records
}

fn push_record(records: &mut Vec<Vec<String>>, record: Vec<String>) {
    let blank = record.iter().all(|value| value.trim().is_empty());
    if !blank {
        records.push(record);
    }
}

/// 含逗号、引号或换行的字段加引号输出。
pub fn escape_field(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') || value.contains('\r') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// 拼接一行（不含换行符）。
pub fn write_row<S: AsRef<str>>(fields: &[S]) -> String {
    fields
        .iter()
        .map(|value| escape_field(value.as_ref()))
        .collect::<Vec<_>>()
        .join(",")
}
