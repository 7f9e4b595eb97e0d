//! 内置字典与默认解析器

/// 内置子域名字典，未指定字典文件时使用
pub fn get_default_sub_data() -> Vec<&'static str> {
    vec![
        "www", "mail", "ftp", "webmail", "smtp", "pop", "imap", "ns", "ns1", "ns2", "ns3", "dns",
        "mx", "mx1", "mx2", "email", "exchange", "remote", "vpn", "ssh", "admin", "portal",
        "intranet", "extranet", "gateway", "proxy", "firewall", "router", "api", "api2", "rest",
        "ws", "app", "apps", "mobile", "m", "wap", "web", "web1", "web2", "cdn", "static",
        "assets", "img", "images", "media", "video", "upload", "download", "files", "docs", "doc",
        "wiki", "blog", "news", "forum", "bbs", "shop", "store", "pay", "payment", "billing",
        "account", "accounts", "auth", "login", "sso", "oauth", "id", "my", "user", "users",
        "db", "database", "mysql", "postgres", "redis", "mongo", "sql", "data", "backup", "bak",
        "old", "new", "dev", "develop", "test", "testing", "qa", "uat", "stage", "staging",
        "demo", "beta", "alpha", "preview", "sandbox", "lab", "labs", "internal", "corp", "office",
        "git", "svn", "ci", "jenkins", "build", "deploy", "monitor", "monitoring", "stats",
        "status", "metrics", "grafana", "kibana", "log", "logs", "search", "es", "cache", "mq",
        "kafka", "queue", "cluster", "node", "node1", "node2", "host", "server", "srv", "service",
        "services", "support", "help", "helpdesk", "ticket", "crm", "erp", "hr", "mailgw",
        "autodiscover", "autoconfig", "cpanel", "whm", "webdisk", "localhost",
    ]
}

/// 默认公共解析器，未指定解析器时使用
pub fn get_default_resolvers() -> Vec<&'static str> {
    vec![
        "1.1.1.1",
        "1.0.0.1",
        "8.8.8.8",
        "8.8.4.4",
        "9.9.9.9",
        "208.67.222.222",
        "208.67.220.220",
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_not_empty() {
        assert!(!get_default_sub_data().is_empty());
        assert!(!get_default_resolvers().is_empty());
    }
}
