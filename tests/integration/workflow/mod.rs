mod git_backup;
mod scenarios;
