//! 命令行参数与输入文件
//!
//! clap参数定义，以及字典文件和解析器列表的装载。

use std::error::Error;
use std::fs::File;
use std::io::{self, BufRead};
use std::path::Path;

use clap::Parser;

/// 输出格式枚举
#[derive(Debug, Clone)]
pub enum OutputFormat {
    /// CSV文件
    Csv,
    /// 纯文本文件
    Txt,
    /// JSON文件
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "csv" => Ok(OutputFormat::Csv),
            "txt" => Ok(OutputFormat::Txt),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!(
                "unsupported output format: {}. supported: csv, txt, json",
                s
            )),
        }
    }
}

/// 命令行参数
#[derive(Parser, Debug)]
#[command(name = "rdnsbrute")]
#[command(author = "gelenlen")]
#[command(version = "1.0")]
#[command(about = "A tool for brute-forcing subdomains with a pool of resolvers", long_about = None, arg_required_else_help = true)]
pub struct Opts {
    /// need scan domain
    #[arg(short, long)]
    pub domain: String,

    /// dic path, use built-in dic on default
    #[arg(short, long)]
    pub file: Option<String>,

    /// resolver ip or resolver list path, use default dns on default
    #[arg(short, long)]
    pub resolvers: Vec<String>,

    /// scan thread count
    #[arg(short, long, default_value = "8")]
    pub threads: usize,

    /// skip name server discovery and zone transfer
    #[arg(long, default_value = "false")]
    pub no_recon: bool,

    /// slient
    #[arg(short, long, default_value = "false")]
    pub slient: bool,

    /// output file path
    #[arg(short, long)]
    pub output: Option<String>,

    /// output format (csv, txt, json)
    #[arg(long, default_value = "csv")]
    pub format: String,

    /// verbose log
    #[arg(long)]
    pub verbose: bool,
}

/// 按行装载字典文件，忽略空行和#注释
pub fn load_wordlist(path: &str) -> Result<Vec<String>, Box<dyn Error>> {
    let file = File::open(path)?;
    let reader = io::BufReader::new(file);
    let mut words = Vec::new();

    for line in reader.lines() {
        let word = line?.trim().to_string();
        if word.is_empty() || word.starts_with('#') {
            continue;
        }
        words.push(word);
    }

    Ok(words)
}

/// 装载解析器参数，每项既可以是地址也可以是列表文件路径
pub fn load_resolvers(args: &[String]) -> Result<Vec<String>, Box<dyn Error>> {
    let mut resolvers = Vec::new();

    for arg in args {
        if Path::new(arg).is_file() {
            resolvers.extend(load_wordlist(arg)?);
        } else {
            resolvers.push(arg.clone());
        }
    }

    Ok(resolvers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_output_format_from_str() {
        assert!(matches!("csv".parse::<OutputFormat>(), Ok(OutputFormat::Csv)));
        assert!(matches!("TXT".parse::<OutputFormat>(), Ok(OutputFormat::Txt)));
        assert!(matches!(
            "json".parse::<OutputFormat>(),
            Ok(OutputFormat::Json)
        ));
        assert!("xml".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn test_load_wordlist_skips_comments_and_blanks() {
        let mut path = std::env::temp_dir();
        path.push("rdnsbrute_wordlist_test.txt");
        let mut file = File::create(&path).unwrap();
        writeln!(file, "www").unwrap();
        writeln!(file, "# comment").unwrap();
        writeln!(file).unwrap();
        writeln!(file, "  mail  ").unwrap();
        drop(file);

        let words = load_wordlist(path.to_str().unwrap()).unwrap();
        assert_eq!(words, vec!["www".to_string(), "mail".to_string()]);

        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn test_load_resolvers_passes_addresses_through() {
        let resolvers = load_resolvers(&["1.1.1.1".to_string(), "8.8.8.8".to_string()]).unwrap();
        assert_eq!(resolvers, vec!["1.1.1.1".to_string(), "8.8.8.8".to_string()]);
    }
}
