use std::path::Path;

use super::Credentials;

pub const PARENT_PATH: &str = "$PARENTPATH$";
pub const FILE_NAME: &str = "$FILENAME$";
pub const FILE_PATH: &str = "$FILEPATH$";
pub const CONNECT_USER: &str = "$CONNECTUSER$";
pub const CONNECT_PASSWORD: &str = "$CONNECTPASSWORD$";
pub const CONNECT_URL: &str = "$CONNECTURL$";

/// Values substituted for the placeholder tokens of one invocation.
pub(crate) struct Placeholders<'a> {
    parent_path: String,
    file_name: String,
    file_path: String,
    credentials: &'a Credentials,
}

impl<'a> Placeholders<'a> {
    pub(crate) fn for_file(file: &Path, credentials: &'a Credentials) -> Self {
        Self {
            parent_path: file
                .parent()
                .map(|parent| parent.display().to_string())
                .unwrap_or_default(),
            file_name: file
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default(),
            file_path: file.display().to_string(),
            credentials,
        }
    }

    fn lookup<'s>(&'s self, placeholder: &'s str) -> &'s str {
        match placeholder {
            PARENT_PATH => &self.parent_path,
            FILE_NAME => &self.file_name,
            FILE_PATH => &self.file_path,
            CONNECT_USER => self.credentials.user.as_deref().unwrap_or_default(),
            CONNECT_PASSWORD => self.credentials.password.as_deref().unwrap_or_default(),
            CONNECT_URL => self.credentials.url.as_deref().unwrap_or_default(),
            _ => placeholder,
        }
    }

    /// Replaces every placeholder in `token` in a single left-to-right pass, so
    /// substituted values are never scanned again.
    pub(crate) fn substitute(&self, token: &str) -> String {
        const ALL: [&str; 6] = [
            PARENT_PATH,
            FILE_NAME,
            FILE_PATH,
            CONNECT_USER,
            CONNECT_PASSWORD,
            CONNECT_URL,
        ];

        let mut out = String::with_capacity(token.len());
        let mut rest = token;
        while let Some(start) = rest.find('$') {
            out.push_str(&rest[..start]);
            let tail = &rest[start..];
            match ALL.iter().find(|placeholder| tail.starts_with(**placeholder)) {
                Some(placeholder) => {
                    out.push_str(self.lookup(placeholder));
                    rest = &tail[placeholder.len()..];
                }
                None => {
                    out.push('$');
                    rest = &tail[1..];
                }
            }
        }
        out.push_str(rest);
        out
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    fn credentials() -> Credentials {
        Credentials {
            user: Some("svc".to_string()),
            password: Some("pa$$word".to_string()),
            url: Some("ldap://dir".to_string()),
        }
    }

    #[test]
    fn substitutes_path_placeholders() {
        let creds = credentials();
        let file = PathBuf::from("/spool/in/users.csv");
        let values = Placeholders::for_file(&file, &creds);

        assert_eq!(values.substitute("$FILEPATH$"), "/spool/in/users.csv");
        assert_eq!(
            values.substitute("--dir=$PARENTPATH$ --name=$FILENAME$"),
            "--dir=/spool/in --name=users.csv"
        );
    }

    #[test]
    fn substitutes_credentials_once() {
        let creds = credentials();
        let file = PathBuf::from("/spool/in/users.csv");
        let values = Placeholders::for_file(&file, &creds);

        assert_eq!(
            values.substitute("$CONNECTUSER$:$CONNECTPASSWORD$@$CONNECTURL$"),
            "svc:pa$$word@ldap://dir"
        );
    }

    #[test]
    fn unknown_dollar_tokens_pass_through() {
        let creds = Credentials::default();
        let file = PathBuf::from("/a/b");
        let values = Placeholders::for_file(&file, &creds);

        assert_eq!(values.substitute("cost $5 $HOME$"), "cost $5 $HOME$");
        assert_eq!(values.substitute("$CONNECTUSER$"), "");
    }

    #[test]
    fn lookup_of_unknown_token_returns_it() {
        let creds = credentials();
        let file = PathBuf::from("/spool/in/users.csv");
        let values = Placeholders::for_file(&file, &creds);

        let token = String::from("$OTHER$");
        assert_eq!(values.lookup(&token), "$OTHER$");
        assert_eq!(values.lookup(FILE_NAME), "users.csv");
    }
}
