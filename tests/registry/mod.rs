mod dispatch;
mod routing;
mod tomes;
