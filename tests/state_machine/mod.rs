mod composition;
mod transitions;
