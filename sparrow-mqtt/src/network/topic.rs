//! 主题与订阅过滤器

/// 共享订阅的前缀
const SHARE_PREFIX: &str = "$share";

/// 是否为共享订阅 `$share/<group>/<filter>`
pub fn is_shared(filter: &str) -> bool {
    let mut levels = filter.splitn(3, '/');
    levels.next() == Some(SHARE_PREFIX) && levels.next().is_some() && levels.next().is_some()
}

/// 拆分共享订阅，返回 (group, filter)
pub fn shared_filter(filter: &str) -> Option<(&str, &str)> {
    let mut levels = filter.splitn(3, '/');
    match (levels.next(), levels.next(), levels.next()) {
        (Some(SHARE_PREFIX), Some(group), Some(filter)) => Some((group, filter)),
        _ => None,
    }
}

/// 发布的 topic 不可以含有通配符
pub fn valid_publish_topic(topic: &str) -> bool {
    !topic.is_empty() && !topic.contains('+') && !topic.contains('#')
}

pub fn valid_subscribe_filter(filter: &str) -> bool {
    // 共享订阅的 group 不能为空，也不能含有通配符
    let filter = match shared_filter(filter) {
        Some((group, _)) if group.is_empty() || group.contains(['+', '#']) => return false,
        Some((_, filter)) => filter,
        None if filter.starts_with("$share/") => return false,
        None => filter,
    };

    // 不可以订阅空 filter
    if filter.is_empty() {
        return false;
    }

    let levels = filter.split('/').collect::<Vec<&str>>();
    if let Some((last, remaining)) = levels.split_last() {
        for level in remaining.iter() {
            // # 字符只能在最后一位，+ 字符必须独占一层
            if level.contains('#') || (level.len() != 1 && level.contains('+')) {
                return false;
            }
        }

        // 最后一层的通配符也必须独占一层
        if last.len() != 1 && last.contains(['+', '#']) {
            return false;
        }
    }

    true
}

/// 匹配订阅的 filter 和发布消息使用的 topic
///
/// 共享订阅只用去掉 `$share/<group>/` 前缀之后的部分匹配。
/// `#` 匹配所在层级以及之后的所有层级，但所在层级必须存在，
/// 所以 `a/#` 匹配 `a/` 而不匹配 `a`。
pub fn matches(filter: &str, topic: &str) -> bool {
    let filter = match shared_filter(filter) {
        Some((_, filter)) => filter,
        None => filter,
    };

    if filter == topic {
        return true;
    }

    let mut topics = topic.split('/');
    for f in filter.split('/') {
        // topic 层级不够了
        let t = match topics.next() {
            Some(t) => t,
            None => return false,
        };

        match f {
            // # 字符匹配所有子级
            "#" => return true,
            // + 字符直接匹配这一层
            "+" => continue,
            // 没有通配符，必须完全匹配
            f if f != t => return false,
            _ => continue,
        }
    }

    // filter 层级不够了
    topics.next().is_none()
}
